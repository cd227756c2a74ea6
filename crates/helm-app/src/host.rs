//! Bridges the multiplexer to a display layer speaking JSON lines.

use std::future::Future;
use std::io;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use helm_mux::{EventFeed, Multiplexer};

use crate::protocol::{parse_line, EventEncoder, Outgoing, Request};

/// Serve requests from `input` and stream events to `output` until the
/// input ends, a `shutdown` request arrives or `stop` resolves. Every
/// session is killed before returning.
pub async fn serve<R, W>(
    mux: Multiplexer,
    mut feed: EventFeed,
    input: R,
    mut output: W,
    stop: impl Future<Output = ()>,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut encoder = EventEncoder::default();
    tokio::pin!(stop);

    let result = loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        log::info!("input closed, shutting down");
                        break Ok(());
                    }
                    Err(e) => break Err(e),
                };
                if line.trim().is_empty() {
                    continue;
                }

                let (seq, request) = parse_line(&line);
                let done = matches!(request, Ok(Request::Shutdown));
                let reply = match request {
                    Ok(request) => match dispatch(&mux, request).await {
                        Ok(result) => Outgoing::success(seq, result),
                        Err(e) => Outgoing::failure(seq, e),
                    },
                    Err(e) => {
                        log::warn!("rejected request: {e}");
                        Outgoing::failure(seq, e)
                    }
                };
                if let Err(e) = send(&mut output, &reply).await {
                    break Err(e);
                }
                if done {
                    break Ok(());
                }
            }
            event = feed.recv() => {
                let Some(event) = event else {
                    break Ok(());
                };
                if let Some(message) = encoder.encode(event) {
                    if let Err(e) = send(&mut output, &message).await {
                        break Err(e);
                    }
                }
            }
            () = &mut stop => {
                log::info!("interrupted, shutting down");
                break Ok(());
            }
        }
    };

    mux.shutdown().await;
    result
}

async fn dispatch(mux: &Multiplexer, request: Request) -> Result<Value, String> {
    let result = match request {
        Request::New { cols, rows } => {
            let id = mux
                .create_session(cols, rows)
                .await
                .map_err(|e| describe(&e))?;
            Value::from(id)
        }
        Request::List => Value::from(mux.list_sessions().await),
        Request::Kill { id } => Value::Bool(mux.kill_session(id).await),
        Request::Write { id, data } => Value::Bool(mux.write_input(id, data).await),
        Request::Resize { id, cols, rows } => Value::Bool(mux.resize_session(id, cols, rows).await),
        Request::Bind { slot, id } => Value::Bool(mux.bind_pane(slot, id).await),
        Request::Unbind { slot } => Value::Bool(mux.unbind_pane(slot).await),
        Request::Split => Value::Bool(mux.toggle_split().await),
        Request::PaneInput { slot, data } => Value::Bool(mux.pane_input(slot, data).await),
        Request::Viewport { slot, cols, rows } => {
            Value::Bool(mux.report_viewport(slot, cols, rows).await)
        }
        Request::Info { id } => {
            serde_json::to_value(mux.session_info(id).await).map_err(|e| e.to_string())?
        }
        Request::Panes => serde_json::to_value(mux.panes().await).map_err(|e| e.to_string())?,
        Request::Shutdown => {
            mux.shutdown().await;
            Value::Bool(true)
        }
    };
    Ok(result)
}

/// `error` and all of its causes, outermost first.
fn describe(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

async fn send<W: AsyncWrite + Unpin>(output: &mut W, message: &Outgoing) -> io::Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_pty::{LaunchConfig, ShellLauncher};
    use std::time::Duration;
    use tokio::io::{BufReader, DuplexStream, Lines};

    fn sh_launcher() -> ShellLauncher {
        ShellLauncher::new(LaunchConfig {
            command: Some("/bin/sh".to_string()),
            args: Some(Vec::new()),
            ..Default::default()
        })
    }

    fn parse_output(output: &[u8]) -> Vec<Value> {
        output
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_slice(line).unwrap())
            .collect()
    }

    async fn next_message(display: &mut Lines<BufReader<DuplexStream>>) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), display.next_line())
            .await
            .expect("timed out waiting for host output")
            .unwrap()
            .expect("host output closed");
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn test_describe_includes_causes() {
        let inner = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let outer = helm_pty::PtyError::IoError(inner);
        assert!(describe(&outer).ends_with("no such file"));
    }

    #[tokio::test]
    async fn test_replies_and_eof_shutdown() {
        let (mux, feed) = Multiplexer::start(sh_launcher());
        let input: &[u8] = b"garbage\n\n{\"op\":\"list\",\"seq\":1}\n{\"op\":\"kill\",\"id\":4,\"seq\":2}\n";
        let mut output = Vec::new();

        serve(mux.clone(), feed, input, &mut output, std::future::pending())
            .await
            .unwrap();

        let messages = parse_output(&output);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["type"], "reply");
        assert_eq!(messages[0]["ok"], false);
        assert_eq!(messages[0]["seq"], Value::Null);
        assert_eq!(messages[1]["seq"], 1);
        assert_eq!(messages[1]["result"], serde_json::json!([]));
        assert_eq!(messages[2]["seq"], 2);
        assert_eq!(messages[2]["result"], false);

        // The multiplexer is gone once the input ends.
        assert!(mux.create_session(80, 24).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_future_ends_serving() {
        let (mux, feed) = Multiplexer::start(sh_launcher());
        let (_client, server) = tokio::io::duplex(1024);
        let mut output = Vec::new();

        tokio::time::timeout(
            Duration::from_secs(2),
            serve(mux, feed, BufReader::new(server), &mut output, async {}),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_shell_session_end_to_end() {
        let (mux, feed) = Multiplexer::start(sh_launcher());
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (display, host_out) = tokio::io::duplex(64 * 1024);
        let host = tokio::spawn(serve(
            mux,
            feed,
            BufReader::new(server),
            host_out,
            std::future::pending(),
        ));
        let mut display = BufReader::new(display).lines();

        client
            .write_all(b"{\"op\":\"new\",\"cols\":80,\"rows\":24,\"seq\":1}\n")
            .await
            .unwrap();
        let reply = next_message(&mut display).await;
        assert_eq!(reply["seq"], 1);
        assert_eq!(reply["ok"], true);
        let id = reply["result"].as_u64().unwrap();

        let bind = format!("{{\"op\":\"bind\",\"slot\":\"primary\",\"id\":{id},\"seq\":2}}\n");
        client.write_all(bind.as_bytes()).await.unwrap();
        let write = format!(
            "{{\"op\":\"write\",\"id\":{id},\"data\":\"echo HELM_$((40 + 2))\\n\",\"seq\":3}}\n"
        );
        client.write_all(write.as_bytes()).await.unwrap();

        let mut seen = String::new();
        let mut pane_event = false;
        while !seen.contains("HELM_42") {
            let message = next_message(&mut display).await;
            match message["type"].as_str().unwrap() {
                "data" => {
                    assert_eq!(message["id"], id);
                    assert_eq!(message["panes"], serde_json::json!(["primary"]));
                    seen.push_str(message["data"].as_str().unwrap());
                }
                "pane" => {
                    assert_eq!(message["slot"], "primary");
                    assert_eq!(message["id"], id);
                    pane_event = true;
                }
                _ => {}
            }
        }
        assert!(pane_event);

        client
            .write_all(b"{\"op\":\"shutdown\",\"seq\":9}\n")
            .await
            .unwrap();
        loop {
            let message = next_message(&mut display).await;
            if message["seq"] == 9 {
                assert_eq!(message["ok"], true);
                break;
            }
        }
        tokio::time::timeout(Duration::from_secs(5), host)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
