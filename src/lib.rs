mod error;
pub mod extract;
pub mod ocr;
pub mod roster;
pub mod route;
pub mod session;
pub mod store;

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use uuid::Uuid;

pub use error::{Error, Result};
pub use ocr::{
    ExtractionController, ExtractionPhase, ExtractionProgress, OcrEngine, PendingImage,
    RecognizedText,
};
pub use route::{MapProvider, Navigator, RouteBatch, RoutePlanner};
pub use session::Preferences;
pub use store::SessionDb;

use roster::Roster;
use session::SessionPersistence;

/// Initialize logging (reads RUST_LOG env var).
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// The assembled pipeline: one roster, one extraction controller, one route
/// planner, all mirrored through one session store.
///
/// The host injects the OCR engine and the navigation collaborator and calls
/// `teardown` when the session is about to be destroyed. Persisted state is
/// restored eagerly in `new`. While an extraction pass is running, every
/// list-mutating command refuses with `ExtractionInProgress`.
pub struct App {
    roster: Arc<Mutex<Roster>>,
    prefs: Arc<Mutex<Preferences>>,
    session: SessionPersistence,
    extraction: ExtractionController,
    planner: RoutePlanner,
}

impl App {
    pub fn new(db: SessionDb, engine: Arc<dyn OcrEngine>, navigator: Arc<dyn Navigator>) -> Self {
        let session = SessionPersistence::new(db);
        let items = session.restore_addresses();
        let prefs = session.restore_preferences();
        let roster = Arc::new(Mutex::new(Roster::restore(session.clone(), items)));

        Self {
            planner: RoutePlanner::new(roster.clone(), navigator),
            extraction: ExtractionController::new(engine),
            prefs: Arc::new(Mutex::new(prefs)),
            roster,
            session,
        }
    }

    // --- image queue -----------------------------------------------------

    /// Validates and queues one image payload for the next extraction pass.
    pub async fn queue_image(&self, name: impl Into<String>, data: Vec<u8>) -> Result<Uuid> {
        self.ensure_not_busy()?;
        let image = PendingImage::from_bytes(name, data)?;
        let id = image.id;
        self.extraction.queue_image(image).await?;
        Ok(id)
    }

    pub async fn queued_images(&self) -> usize {
        self.extraction.queued().await
    }

    // --- extraction ------------------------------------------------------

    /// Runs one OCR pass over everything queued, merging normalized matches
    /// into the roster. Returns the merged roster length.
    pub async fn extract_addresses(&self) -> Result<usize> {
        let destination_state = self.prefs.lock().await.destination_state.clone();
        self.extraction.run(&self.roster, &destination_state).await
    }

    pub fn acknowledge_extraction_failure(&self) {
        self.extraction.acknowledge_failure();
    }

    pub fn extraction_progress(&self) -> ExtractionProgress {
        self.extraction.progress()
    }

    pub fn subscribe_extraction(&self) -> watch::Receiver<ExtractionProgress> {
        self.extraction.subscribe()
    }

    // --- roster ----------------------------------------------------------

    pub async fn addresses(&self) -> Vec<String> {
        self.roster.lock().await.items().to_vec()
    }

    pub async fn add_address(&self, address: impl Into<String>) -> Result<()> {
        self.ensure_not_busy()?;
        self.roster.lock().await.add(address);
        Ok(())
    }

    pub async fn edit_address(&self, index: usize, text: impl Into<String>) -> Result<()> {
        self.ensure_not_busy()?;
        self.roster.lock().await.edit_at(index, text)
    }

    pub async fn delete_address(&self, index: usize) -> Result<String> {
        self.ensure_not_busy()?;
        self.roster.lock().await.delete_at(index)
    }

    pub async fn move_address(&self, from: usize, to: usize) -> Result<()> {
        self.ensure_not_busy()?;
        self.roster.lock().await.move_to(from, to)
    }

    // --- preferences -----------------------------------------------------

    pub async fn preferences(&self) -> Preferences {
        self.prefs.lock().await.clone()
    }

    pub async fn set_destination_state(&self, code: impl Into<String>) {
        let code = code.into();
        self.prefs.lock().await.destination_state = code.clone();
        self.session.save_destination_state(&code);
    }

    /// Switching the provider drops any pending route link so the next
    /// request recomputes; a scheduled batch commit keeps running.
    pub async fn set_provider(&self, provider: MapProvider) {
        self.prefs.lock().await.provider = provider;
        self.session.save_provider(provider);
        self.planner.clear_pending_link().await;
    }

    // --- routing ---------------------------------------------------------

    /// Builds (or replays) the navigation deep-link for the current roster
    /// prefix and dispatches it to the navigation collaborator.
    pub async fn request_directions(&self, user_agent: &str) -> Result<String> {
        self.ensure_not_busy()?;
        let provider = self.prefs.lock().await.provider;
        self.planner.request_directions(provider, user_agent).await
    }

    pub async fn pending_batch(&self) -> Option<RouteBatch> {
        self.planner.pending_batch().await
    }

    // --- lifecycle -------------------------------------------------------

    /// Session-end cleanup: cancels any scheduled batch commit and clears
    /// the persisted mirror so the next session starts clean.
    pub fn teardown(&self) {
        self.planner.shutdown();
        self.session.teardown();
    }

    fn ensure_not_busy(&self) -> Result<()> {
        if self.extraction.is_busy() {
            return Err(Error::ExtractionInProgress);
        }
        Ok(())
    }
}
