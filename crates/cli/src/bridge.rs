//! JSON-lines bridge between a host process and the worker.
//!
//! Each input line is one inbound message; each worker message is written as
//! one output line. The bridge does not parse messages: the worker validates
//! what it receives and the host interprets what it gets back.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Line counts for one bridge session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub received: u64,
    pub sent: u64,
}

/// Pumps `input` into the worker and worker messages into `output` until
/// the input ends and the worker has sent its last message.
///
/// Closing the worker's inbox at end of input lets requests already in
/// flight finish before the worker closes its outbox.
pub async fn run<R, W>(
    input: R,
    mut output: W,
    inbox: mpsc::Sender<String>,
    mut outbox: mpsc::Receiver<String>,
) -> std::io::Result<BridgeStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let forward = async move {
        let mut lines = input.lines();
        let mut received = 0u64;
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if inbox.send(line.to_string()).await.is_err() {
                warn!("Worker stopped accepting messages");
                break;
            }
            received += 1;
        }
        debug!(received, "Input closed");
        Ok::<_, std::io::Error>(received)
    };

    let relay = async {
        let mut sent = 0u64;
        while let Some(message) = outbox.recv().await {
            output.write_all(message.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
            sent += 1;
        }
        debug!(sent, "Worker outbox closed");
        Ok::<_, std::io::Error>(sent)
    };

    let (received, sent) = tokio::try_join!(forward, relay)?;
    Ok(BridgeStats { received, sent })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use example_plugins::builtin_registry;
    use extraction::Router;
    use serde_json::Value;
    use worker::{spawn_isolated, FeatureExtractionWorker, WorkerConfig};

    use crate::catalog::default_catalog;

    #[tokio::test]
    async fn lines_round_trip_through_the_worker() {
        let config = WorkerConfig::default();
        let worker = FeatureExtractionWorker::new(
            Router::new(builtin_registry()),
            Arc::new(default_catalog()),
            &config,
        );
        let (inbox, outbox, thread) = spawn_isolated(worker, 8).unwrap().into_parts();
        let input = concat!(
            r#"{"method":"import","params":"energy"}"#,
            "\n\n",
            r#"{"method":"list","id":"l"}"#,
            "\n",
            r#"{"method":"process","id":"p","params":{"combinedKey":"energy:rms","outputId":"rms","audioChannels":[[0.5,0.5,0.5,0.5]],"audioFormat":{"sampleRate":4.0,"channelCount":1,"frameLength":4}}}"#,
            "\n",
        );
        let mut output = Vec::new();

        let stats = run(input.as_bytes(), &mut output, inbox, outbox)
            .await
            .unwrap();
        thread.join().unwrap();

        let messages: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.sent, messages.len() as u64);

        assert_eq!(messages[0]["method"], "import");
        assert_eq!(messages[0]["key"], "energy");
        assert_eq!(messages[0]["result"]["available"][0]["key"], "energy:rms");

        let list = messages.iter().find(|m| m["method"] == "list").unwrap();
        assert_eq!(list["result"]["available"].as_array().unwrap().len(), 3);

        let process: Vec<&Value> = messages.iter().filter(|m| m["id"] == "p").collect();
        assert_eq!(process.len(), 2);
        assert_eq!(process[0]["method"], "process");
        assert_eq!(process[0]["result"]["progress"]["totalBlockCount"], 1);
        assert_eq!(process[1]["method"], "complete");
    }
}
