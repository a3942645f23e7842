use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::extract::{extract_addresses, normalize};
use crate::roster::Roster;

use super::engine::{OcrEngine, PendingImage};

/// Language code handed to the engine for every pass.
pub const OCR_LANGUAGE: &str = "eng";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExtractionPhase {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Published on every phase or counter change. `current`/`total` track the
/// image being processed within the pass, one-based.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionProgress {
    pub phase: ExtractionPhase,
    pub current: usize,
    pub total: usize,
}

impl ExtractionProgress {
    fn idle(total: usize) -> Self {
        Self {
            phase: ExtractionPhase::Idle,
            current: 0,
            total,
        }
    }
}

/// Drives OCR passes over the queued images.
///
/// Phases: Idle → Running → {Succeeded, Failed} → Idle. Running doubles as
/// the busy flag that blocks every list-mutating entry point; Failed must be
/// acknowledged before another pass may start. Images are processed strictly
/// one at a time so progress reporting stays ordered.
pub struct ExtractionController {
    engine: Arc<dyn OcrEngine>,
    queue: Mutex<Vec<PendingImage>>,
    progress_tx: watch::Sender<ExtractionProgress>,
}

impl ExtractionController {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        let (progress_tx, _) = watch::channel(ExtractionProgress::idle(0));
        Self {
            engine,
            queue: Mutex::new(Vec::new()),
            progress_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ExtractionProgress> {
        self.progress_tx.subscribe()
    }

    pub fn progress(&self) -> ExtractionProgress {
        self.progress_tx.borrow().clone()
    }

    /// True while a pass is running. This is the single busy flag guarding
    /// all mutating entry points; there is no lock primitive behind it.
    pub fn is_busy(&self) -> bool {
        self.progress_tx.borrow().phase == ExtractionPhase::Running
    }

    pub async fn queue_image(&self, image: PendingImage) -> Result<()> {
        if self.is_busy() {
            return Err(Error::ExtractionInProgress);
        }

        let mut queue = self.queue.lock().await;
        queue.push(image);
        let total = queue.len();
        let phase = self.progress_tx.borrow().phase;
        self.progress_tx.send_replace(ExtractionProgress {
            phase,
            current: 0,
            total,
        });
        Ok(())
    }

    pub async fn queued(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Resets a Failed phase back to Idle. Until called, no new pass starts.
    pub fn acknowledge_failure(&self) {
        if self.progress_tx.borrow().phase == ExtractionPhase::Failed {
            self.progress_tx.send_replace(ExtractionProgress::idle(0));
        }
    }

    /// Runs one extraction pass over everything queued.
    ///
    /// The collector is seeded with the roster's current contents before the
    /// first image, so earlier entries are preserved and a re-run never
    /// duplicates them. Any engine failure aborts the whole pass: nothing
    /// recognized from earlier images in the pass is merged, the queue is
    /// dropped, and the phase lands on Failed. On success the roster is
    /// replaced wholesale by the deduplicated merge. Returns the merged list
    /// length.
    pub async fn run(&self, roster: &Mutex<Roster>, destination_state: &str) -> Result<usize> {
        // guard and transition in one step, under the channel's own lock,
        // so two concurrent callers can never both claim the pass
        let mut rejected = None;
        let mut resumed_from = ExtractionPhase::Idle;
        self.progress_tx.send_if_modified(|progress| match progress.phase {
            ExtractionPhase::Running => {
                rejected = Some(Error::ExtractionInProgress);
                false
            }
            ExtractionPhase::Failed => {
                rejected = Some(Error::FailureNotAcknowledged);
                false
            }
            phase @ (ExtractionPhase::Idle | ExtractionPhase::Succeeded) => {
                resumed_from = phase;
                progress.phase = ExtractionPhase::Running;
                progress.current = 0;
                true
            }
        });
        if let Some(err) = rejected {
            return Err(err);
        }

        let images = {
            let mut queue = self.queue.lock().await;
            if queue.is_empty() {
                self.progress_tx.send_replace(ExtractionProgress {
                    phase: resumed_from,
                    current: 0,
                    total: 0,
                });
                return Err(Error::NoImagesQueued);
            }
            std::mem::take(&mut *queue)
        };

        let pass_id = Uuid::new_v4();
        let total = images.len();
        info!("extraction pass {pass_id}: {total} image(s), state {destination_state}");

        self.progress_tx.send_replace(ExtractionProgress {
            phase: ExtractionPhase::Running,
            current: 0,
            total,
        });

        let existing = roster.lock().await.items().to_vec();
        let mut collected = Vec::new();

        for (index, image) in images.iter().enumerate() {
            self.progress_tx.send_replace(ExtractionProgress {
                phase: ExtractionPhase::Running,
                current: index + 1,
                total,
            });

            match self.engine.recognize(image, OCR_LANGUAGE).await {
                Ok(recognized) => {
                    let matches = extract_addresses(&recognized.text);
                    info!(
                        "extraction pass {pass_id}: image {} ({}x{}) produced {} match(es)",
                        image.name,
                        image.width,
                        image.height,
                        matches.len()
                    );
                    for raw in matches {
                        collected.push(normalize(raw, destination_state));
                    }
                }
                Err(err) => {
                    warn!(
                        "extraction pass {pass_id}: engine failed on image {} ({} of {total}): {err}",
                        image.name,
                        index + 1
                    );
                    self.progress_tx.send_replace(ExtractionProgress {
                        phase: ExtractionPhase::Failed,
                        current: 0,
                        total: 0,
                    });
                    return Err(Error::Recognition(err.to_string()));
                }
            }
        }

        let merged_len = roster
            .lock()
            .await
            .merge_from_extraction(existing, collected);

        self.progress_tx.send_replace(ExtractionProgress {
            phase: ExtractionPhase::Succeeded,
            current: 0,
            total: 0,
        });
        info!("extraction pass {pass_id}: merged roster now holds {merged_len} address(es)");

        Ok(merged_len)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::ocr::engine::{png_fixture, RecognizedText};
    use crate::session::SessionPersistence;
    use crate::store::SessionDb;

    /// Scripted engine: yields prepared outputs in order; `Err` entries
    /// simulate a recognition failure on that image.
    struct ScriptedEngine {
        outputs: StdMutex<Vec<anyhow::Result<String>>>,
    }

    impl ScriptedEngine {
        fn new(outputs: Vec<anyhow::Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                outputs: StdMutex::new(outputs),
            })
        }
    }

    #[async_trait]
    impl OcrEngine for ScriptedEngine {
        async fn recognize(
            &self,
            _image: &PendingImage,
            _language: &str,
        ) -> anyhow::Result<RecognizedText> {
            let next = self.outputs.lock().unwrap().remove(0);
            next.map(|text| RecognizedText { text })
        }
    }

    fn test_roster() -> (tempfile::TempDir, Arc<Mutex<Roster>>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = SessionDb::open(dir.path().join("session.sqlite3")).expect("open store");
        let session = SessionPersistence::new(db);
        let roster = Arc::new(Mutex::new(Roster::new(session)));
        (dir, roster)
    }

    fn queued_image() -> PendingImage {
        PendingImage::from_bytes("label.png", png_fixture(2, 2)).unwrap()
    }

    #[tokio::test]
    async fn pass_extracts_and_normalizes_a_label() {
        let engine = ScriptedEngine::new(vec![Ok("123 MAIN ST\nSUITE 4\nANYTOWN CA\n".into())]);
        let controller = ExtractionController::new(engine);
        let (_dir, roster) = test_roster();

        controller.queue_image(queued_image()).await.unwrap();
        controller.run(&roster, "CA").await.unwrap();

        assert_eq!(
            roster.lock().await.items(),
            ["123 main st suite 4 anytown ca, ca"]
        );
        assert_eq!(controller.progress().phase, ExtractionPhase::Succeeded);
        assert_eq!(controller.queued().await, 0);
    }

    #[tokio::test]
    async fn rerun_over_identical_text_adds_no_duplicates() {
        let text = "700 PINE ST\nLAKESIDE CA\n";
        let engine = ScriptedEngine::new(vec![Ok(text.into()), Ok(text.into())]);
        let controller = ExtractionController::new(engine);
        let (_dir, roster) = test_roster();

        controller.queue_image(queued_image()).await.unwrap();
        controller.run(&roster, "CA").await.unwrap();
        let after_first = roster.lock().await.items().to_vec();

        controller.queue_image(queued_image()).await.unwrap();
        controller.run(&roster, "CA").await.unwrap();

        assert_eq!(roster.lock().await.items(), after_first.as_slice());
    }

    #[tokio::test]
    async fn existing_entries_survive_and_lead_the_merged_list() {
        let engine = ScriptedEngine::new(vec![Ok("820 CEDAR RD\nHILLVIEW CA\n".into())]);
        let controller = ExtractionController::new(engine);
        let (_dir, roster) = test_roster();
        roster.lock().await.add("manually entered, ca");

        controller.queue_image(queued_image()).await.unwrap();
        controller.run(&roster, "CA").await.unwrap();

        assert_eq!(
            roster.lock().await.items(),
            ["manually entered, ca", "820 cedar rd hillview ca, ca"]
        );
    }

    #[tokio::test]
    async fn failure_mid_pass_keeps_the_roster_untouched() {
        let engine = ScriptedEngine::new(vec![
            Ok("700 PINE ST\nLAKESIDE CA\n".into()),
            Err(anyhow::anyhow!("engine crashed")),
            Ok("820 CEDAR RD\nHILLVIEW CA\n".into()),
        ]);
        let controller = ExtractionController::new(engine);
        let (_dir, roster) = test_roster();
        roster.lock().await.add("kept, ca");

        for _ in 0..3 {
            controller.queue_image(queued_image()).await.unwrap();
        }

        let err = controller.run(&roster, "CA").await.unwrap_err();
        assert!(matches!(err, Error::Recognition(_)));
        assert_eq!(roster.lock().await.items(), ["kept, ca"]);
        assert_eq!(controller.progress().phase, ExtractionPhase::Failed);
        // queue is dropped even on failure
        assert_eq!(controller.queued().await, 0);
    }

    #[tokio::test]
    async fn failed_phase_blocks_new_passes_until_acknowledged() {
        let engine = ScriptedEngine::new(vec![
            Err(anyhow::anyhow!("boom")),
            Ok("700 PINE ST\nLAKESIDE CA\n".into()),
        ]);
        let controller = ExtractionController::new(engine);
        let (_dir, roster) = test_roster();

        controller.queue_image(queued_image()).await.unwrap();
        assert!(controller.run(&roster, "CA").await.is_err());

        controller.queue_image(queued_image()).await.unwrap();
        let err = controller.run(&roster, "CA").await.unwrap_err();
        assert!(matches!(err, Error::FailureNotAcknowledged));

        controller.acknowledge_failure();
        controller.run(&roster, "CA").await.unwrap();
        assert_eq!(roster.lock().await.len(), 1);
    }

    /// Engine that signals when a pass has reached it and holds the pass
    /// open until the test releases it.
    #[derive(Default)]
    struct GatedEngine {
        started: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl OcrEngine for GatedEngine {
        async fn recognize(
            &self,
            _image: &PendingImage,
            _language: &str,
        ) -> anyhow::Result<RecognizedText> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(RecognizedText {
                text: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn only_one_pass_can_claim_the_running_phase() {
        let engine = Arc::new(GatedEngine::default());
        let controller = Arc::new(ExtractionController::new(engine.clone()));
        let (_dir, roster) = test_roster();

        controller.queue_image(queued_image()).await.unwrap();
        let first = tokio::spawn({
            let controller = controller.clone();
            let roster = roster.clone();
            async move { controller.run(&roster, "CA").await }
        });

        engine.started.notified().await;
        let err = controller.run(&roster, "CA").await.unwrap_err();
        assert!(matches!(err, Error::ExtractionInProgress));

        engine.release.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(controller.progress().phase, ExtractionPhase::Succeeded);
    }

    #[tokio::test]
    async fn empty_queue_refuses_to_run() {
        let engine = ScriptedEngine::new(vec![]);
        let controller = ExtractionController::new(engine);
        let (_dir, roster) = test_roster();

        let err = controller.run(&roster, "CA").await.unwrap_err();
        assert!(matches!(err, Error::NoImagesQueued));
    }
}
