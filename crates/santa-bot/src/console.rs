// Line-oriented console transport.
//
// Each input line is `<user_id> <text>`. A reader task parses lines and
// forwards them over an mpsc channel; the dispatch loop answers each one on
// the output writer as `[<user_id>] <reply>`.

use std::future::Future;

use santa_core::model::UserId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;

/// One inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub user_id: UserId,
    pub text: String,
}

/// Parse `<user_id> <text>`. Returns `None` for blank or malformed lines.
pub fn parse_line(line: &str) -> Option<Inbound> {
    let line = line.trim();
    let (user, text) = line.split_once(char::is_whitespace)?;
    let user_id = user.parse().ok()?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(Inbound {
        user_id,
        text: text.to_string(),
    })
}

/// Read lines from `reader` until EOF, forwarding parsed messages through
/// `tx`. Returns when the input ends or the receiver is dropped.
///
/// Generic over the reader so tests can feed in-memory input.
pub async fn read_lines<R>(reader: R, tx: mpsc::Sender<Inbound>) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some(msg) => {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            None => warn!("ignoring malformed input line: {line:?}"),
        }
    }
    info!("console input closed");
    Ok(())
}

/// Answer every message from `rx` on `out` until the channel closes.
pub async fn run<W>(
    mut rx: mpsc::Receiver<Inbound>,
    dispatcher: &Dispatcher,
    out: &mut W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        let reply = dispatcher.dispatch(msg.user_id, &msg.text);
        for line in reply.lines() {
            out.write_all(format!("[{}] {line}\n", msg.user_id).as_bytes())
                .await?;
        }
        out.flush().await?;
    }
    Ok(())
}

/// How a console session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    InputClosed,
    Interrupted,
}

/// Run a full console session: read from `reader`, answer on `out`, and stop
/// at end of input or as soon as `shutdown` resolves.
///
/// On `Interrupted` the reader task is aborted, but a read already blocked in
/// the OS (e.g. on stdin) only returns once input arrives.
pub async fn serve<R, W, S>(
    reader: R,
    dispatcher: &Dispatcher,
    out: &mut W,
    shutdown: S,
) -> anyhow::Result<Exit>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let (tx, rx) = mpsc::channel(64);
    let reader_handle = tokio::spawn(async move {
        if let Err(e) = read_lines(reader, tx).await {
            error!("Console reader error: {}", e);
        }
    });

    let result = tokio::select! {
        result = run(rx, dispatcher, out) => result.map(|()| Exit::InputClosed),
        () = shutdown => Ok(Exit::Interrupted),
    };

    reader_handle.abort();
    result
}
