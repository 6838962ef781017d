use facewatch_core::Speaker;
use tokio::process::Command;
use tokio::sync::mpsc;

const QUEUE_DEPTH: usize = 8;

/// Speaks phrases one at a time through an external TTS program.
///
/// `speak` only enqueues; a worker task runs the program with the phrase as
/// its last argument and waits for it to exit before taking the next one.
pub struct SpeechQueue {
    tx: mpsc::Sender<String>,
}

impl SpeechQueue {
    /// `command` is split on whitespace: the program, then fixed arguments.
    /// Must be called from within a tokio runtime.
    pub fn spawn(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        let args: Vec<String> = parts.collect();

        let (tx, mut rx) = mpsc::channel::<String>(QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(phrase) = rx.recv().await {
                if program.is_empty() {
                    tracing::debug!(%phrase, "no speech command configured");
                    continue;
                }
                match Command::new(&program).args(&args).arg(&phrase).status().await {
                    Ok(status) if status.success() => tracing::debug!(%phrase, "spoken"),
                    Ok(status) => tracing::warn!(%program, %status, "speech command failed"),
                    Err(e) => tracing::warn!(%program, error = %e, "failed to run speech command"),
                }
            }
        });

        Self { tx }
    }
}

impl Speaker for SpeechQueue {
    fn speak(&self, phrase: &str) {
        if let Err(e) = self.tx.try_send(phrase.to_string()) {
            tracing::warn!(phrase, error = %e, "speech queue rejected phrase");
        }
    }
}
