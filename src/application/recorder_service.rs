// Recorder service - drives the recorder from the sensor feed and fans out events
use crate::application::notifier::NotificationSink;
use crate::application::polar_store::{PolarStore, StoreError, is_valid_file_name};
use crate::application::reading_source::ReadingSource;
use crate::application::recorder::{PersistJob, Recorder, SampleInput, TickOutcome};
use crate::domain::events::RecorderEvent;
use crate::domain::performance::{LiveData, PerformanceComparison};
use crate::domain::polar::PolarTable;
use crate::domain::readings::Quantity;
use crate::domain::recording::{MotoringConfig, RecordingMode, RecordingState};
use crate::infrastructure::config::RecorderConfig;
use anyhow::Context;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

enum PersistCommand {
    /// `done`, when present, receives the result instead of it being
    /// published as an error event.
    Save {
        job: PersistJob,
        done: Option<oneshot::Sender<Result<(), StoreError>>>,
    },
    /// Answered once every save queued before it has finished.
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct RecorderService {
    recorder: Arc<Mutex<Recorder>>,
    source: Arc<dyn ReadingSource>,
    store: Arc<dyn PolarStore>,
    sink: Arc<dyn NotificationSink>,
    motoring: MotoringConfig,
    interval: Duration,
    persist_tx: mpsc::UnboundedSender<PersistCommand>,
    tick_guard: Arc<Mutex<()>>,
}

impl RecorderService {
    /// Loads both live tables and starts the persistence writer.
    pub async fn initialize(
        config: &RecorderConfig,
        source: Arc<dyn ReadingSource>,
        store: Arc<dyn PolarStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let baseline = load_or_empty(store.as_ref(), sink.as_ref(), &config.storage.polar_file).await;
        let auto_table =
            load_or_empty(store.as_ref(), sink.as_ref(), &config.storage.auto_recording_file).await;
        tracing::info!(
            "Loaded {} baseline cells from {} and {} cells from {}",
            baseline.len(),
            config.storage.polar_file,
            auto_table.len(),
            config.storage.auto_recording_file
        );

        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        tokio::spawn(persist_loop(store.clone(), sink.clone(), persist_rx));

        Self {
            recorder: Arc::new(Mutex::new(Recorder::new(config, baseline, auto_table))),
            source,
            store,
            sink,
            motoring: config.motoring,
            interval: config.sampling.interval(),
            persist_tx,
            tick_guard: Arc::new(Mutex::new(())),
        }
    }

    /// One sampling pass. Returns `None` when another tick is still running.
    ///
    /// Events and saves are issued before the recorder lock is released, so
    /// clients and the writer see changes in the order they were made.
    pub async fn tick(&self) -> Option<TickOutcome> {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            tracing::debug!("Previous tick still in flight, skipping");
            return None;
        };

        let input = self.fetch_readings().await;
        let now = Utc::now();
        let mut recorder = self.recorder.lock().await;
        let mut outcome = recorder.sample(&input, now);
        self.dispatch(&mut outcome);
        drop(recorder);
        Some(outcome)
    }

    async fn fetch_readings(&self) -> SampleInput {
        let fetches = Quantity::ALL.map(|quantity| async move {
            (quantity, self.source.reading(quantity.path()).await)
        });

        let mut input = SampleInput::new();
        for (quantity, result) in join_all(fetches).await {
            match result {
                Ok(Some(reading)) => input.insert(quantity, reading),
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to read {}: {:#}", quantity, e),
            }
        }
        input
    }

    fn dispatch(&self, outcome: &mut TickOutcome) {
        if let Some(state) = &outcome.recording {
            tracing::info!(
                "Recording {} ({:?} mode, {})",
                if state.recording_active { "started" } else { "stopped" },
                state.recording_mode,
                state.active_file
            );
            self.sink.publish(RecorderEvent::record_status(state));
        }

        if let Some(job) = outcome.persist.take() {
            if let Some(merge) = &outcome.merge {
                self.sink.publish(RecorderEvent::polar_updated(&job.file, merge));
            }
            self.queue_save(job);
        }

        if let Some((live, performance)) = &outcome.live {
            self.sink.publish(RecorderEvent::live_performance(live, performance));
        }

        if outcome.rejections_changed {
            self.sink.publish(RecorderEvent::errors(&outcome.rejections));
        }
    }

    fn queue_save(&self, job: PersistJob) {
        if self.persist_tx.send(PersistCommand::Save { job, done: None }).is_err() {
            tracing::error!("Persistence writer has stopped; table not saved");
        }
    }

    /// Waits until every save queued so far has been written.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.persist_tx.send(PersistCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    pub async fn set_motoring(&self, motoring: bool) {
        let mut recorder = self.recorder.lock().await;
        let update = recorder.set_motoring(motoring);
        if update.motoring_changed {
            tracing::info!("Motoring {}", if motoring { "detected" } else { "ended" });
            self.sink.publish(RecorderEvent::ChangeMotoringStatus { motoring });
        }
        self.publish_state(update.recording);
    }

    /// Re-reads propulsion and applies the motoring interlock.
    pub async fn refresh_motoring(&self) -> anyhow::Result<bool> {
        let engines = self
            .source
            .propulsion()
            .await
            .context("Failed to read propulsion state")?;
        let motoring = self.motoring.is_motoring(&engines);
        self.set_motoring(motoring).await;
        Ok(motoring)
    }

    pub async fn set_recording_mode(&self, mode: RecordingMode) -> RecordingState {
        let mut recorder = self.recorder.lock().await;
        let transition = recorder.set_mode(mode);
        tracing::info!("Recording mode set to {:?}", mode);
        self.publish_state(transition);
        recorder.state().clone()
    }

    /// User start/stop. Starting with a different `file` loads it first and
    /// makes it the baseline.
    pub async fn set_recording_active(
        &self,
        active: bool,
        file: Option<String>,
    ) -> anyhow::Result<RecordingState> {
        let mut selection = None;
        if let Some(file) = file.filter(|_| active) {
            if !is_valid_file_name(&file) {
                return Err(StoreError::InvalidFileName(file).into());
            }
            let already_loaded = self.recorder.lock().await.manual_file() == file;
            if !already_loaded {
                let table = self.store.load(&file).await?;
                selection = Some((file, table));
            }
        }

        let mut recorder = self.recorder.lock().await;
        let transition = if active {
            recorder.start_manual(selection)?
        } else {
            recorder.stop_manual()?
        };
        self.publish_state(transition);
        Ok(recorder.state().clone())
    }

    fn publish_state(&self, transition: Option<RecordingState>) {
        if let Some(state) = transition {
            self.sink.publish(RecorderEvent::record_status(&state));
        }
    }

    pub async fn state(&self) -> RecordingState {
        self.recorder.lock().await.state().clone()
    }

    pub async fn live(&self) -> Option<LiveData> {
        self.recorder.lock().await.live()
    }

    pub async fn compare(&self, live: &LiveData) -> PerformanceComparison {
        self.recorder.lock().await.compare(live)
    }

    /// The named table, or the baseline when no name is given. Live tables
    /// are served from memory so unsaved merges are included.
    pub async fn polar_data(&self, file: Option<&str>) -> anyhow::Result<PolarTable> {
        let Some(file) = file else {
            return Ok(self.recorder.lock().await.baseline().clone());
        };
        if !is_valid_file_name(file) {
            return Err(StoreError::InvalidFileName(file.to_string()).into());
        }
        if let Some(table) = self.recorder.lock().await.table_for(file) {
            return Ok(table.clone());
        }
        Ok(self.store.load(file).await?)
    }

    pub async fn list_files(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.store.list().await?)
    }

    pub async fn create_file(&self, file: &str) -> anyhow::Result<()> {
        if !is_valid_file_name(file) {
            return Err(StoreError::InvalidFileName(file.to_string()).into());
        }
        self.store.create(file).await?;
        tracing::info!("Created polar file {}", file);
        Ok(())
    }

    /// Swaps an imported table in if `file` is a live table and writes it
    /// behind any save already queued for that file.
    pub async fn import(&self, file: &str, table: PolarTable) -> anyhow::Result<usize> {
        if !is_valid_file_name(file) {
            return Err(StoreError::InvalidFileName(file.to_string()).into());
        }
        let cells = table.len();
        let (done_tx, done_rx) = oneshot::channel();
        let live = {
            let mut recorder = self.recorder.lock().await;
            let live = recorder.replace_table(file, table.clone());
            let job = PersistJob {
                file: file.to_string(),
                table,
            };
            self.persist_tx
                .send(PersistCommand::Save {
                    job,
                    done: Some(done_tx),
                })
                .map_err(|_| anyhow::anyhow!("Persistence writer has stopped"))?;
            live
        };
        done_rx
            .await
            .context("Persistence writer stopped before saving the import")??;
        tracing::info!(
            "Imported {} cells into {}{}",
            cells,
            file,
            if live { " (in use)" } else { "" }
        );
        Ok(cells)
    }

    pub async fn run_sampler(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("Sampling every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("Sampler stopped");
    }

    pub async fn watch_propulsion(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if let Err(e) = self.refresh_motoring().await {
                tracing::warn!("{:#}", e);
            }
            tokio::select! {
                _ = self.source.propulsion_changed() => {}
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("Propulsion watcher stopped");
    }
}

async fn load_or_empty(store: &dyn PolarStore, sink: &dyn NotificationSink, file: &str) -> PolarTable {
    match store.load(file).await {
        Ok(table) => table,
        Err(e) => {
            tracing::warn!("Starting {} empty: {}", file, e);
            sink.publish(RecorderEvent::errors([e]));
            PolarTable::new()
        }
    }
}

async fn persist_loop(
    store: Arc<dyn PolarStore>,
    sink: Arc<dyn NotificationSink>,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            PersistCommand::Save { job, done } => {
                let result = store.save(&job.file, &job.table).await;
                match (result, done) {
                    (result, Some(done)) => {
                        let _ = done.send(result);
                    }
                    (Err(e), None) => {
                        tracing::error!("Failed to save {}: {}", job.file, e);
                        sink.publish(RecorderEvent::errors([format!("failed to save {}: {}", job.file, e)]));
                    }
                    (Ok(()), None) => {}
                }
            }
            PersistCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::polar::PolarGrid;
    use crate::domain::readings::{PropulsionStatus, Reading};
    use crate::domain::recording::RecordingError;
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};

    const KNOTS: f64 = 1.94384;
    const AUTO_FILE: &str = "auto-recording-polar.json";

    #[derive(Default)]
    struct FakeSource {
        readings: std::sync::Mutex<HashMap<&'static str, Reading>>,
        engines: std::sync::Mutex<Vec<PropulsionStatus>>,
    }

    impl FakeSource {
        fn sail(&self, twa_deg: f64, tws_kt: f64, stw_kt: f64, cog_deg: f64) {
            let now = Utc::now();
            let mut readings = self.readings.lock().unwrap();
            for (quantity, value) in [
                (Quantity::TrueWindAngle, twa_deg.to_radians()),
                (Quantity::TrueWindSpeed, tws_kt / KNOTS),
                (Quantity::SpeedThroughWater, stw_kt / KNOTS),
                (Quantity::CourseOverGround, cog_deg.to_radians()),
            ] {
                readings.insert(quantity.path(), Reading::new(value, now));
            }
        }

        fn engine(&self, state: &str) {
            let mut engine = PropulsionStatus::new("main");
            engine.state = Some(state.to_string());
            *self.engines.lock().unwrap() = vec![engine];
        }
    }

    #[async_trait]
    impl ReadingSource for FakeSource {
        async fn reading(&self, path: &str) -> anyhow::Result<Option<Reading>> {
            Ok(self.readings.lock().unwrap().get(path).copied())
        }

        async fn propulsion(&self) -> anyhow::Result<Vec<PropulsionStatus>> {
            Ok(self.engines.lock().unwrap().clone())
        }

        async fn propulsion_changed(&self) {
            std::future::pending::<()>().await
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        tables: std::sync::Mutex<HashMap<String, PolarTable>>,
        corrupt: HashSet<String>,
        fail_saves: AtomicBool,
        slow_saves: AtomicBool,
    }

    impl MemoryStore {
        fn table(&self, file: &str) -> Option<PolarTable> {
            self.tables.lock().unwrap().get(file).cloned()
        }
    }

    #[async_trait]
    impl PolarStore for MemoryStore {
        async fn load(&self, file: &str) -> Result<PolarTable, StoreError> {
            if self.corrupt.contains(file) {
                return Err(StoreError::Malformed {
                    file: file.to_string(),
                    source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
                });
            }
            Ok(self.table(file).unwrap_or_default())
        }

        async fn save(&self, file: &str, table: &PolarTable) -> Result<(), StoreError> {
            if self.slow_saves.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StoreError::Io {
                    file: file.to_string(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.tables.lock().unwrap().insert(file.to_string(), table.clone());
            Ok(())
        }

        async fn list(&self) -> Result<Vec<String>, StoreError> {
            let mut files: Vec<String> = self.tables.lock().unwrap().keys().cloned().collect();
            files.sort();
            Ok(files)
        }

        async fn create(&self, file: &str) -> Result<(), StoreError> {
            let mut tables = self.tables.lock().unwrap();
            if tables.contains_key(file) {
                return Err(StoreError::AlreadyExists(file.to_string()));
            }
            tables.insert(file.to_string(), PolarTable::new());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        events: std::sync::Mutex<Vec<RecorderEvent>>,
    }

    impl CollectingSink {
        fn take(&self) -> Vec<RecorderEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl NotificationSink for CollectingSink {
        fn publish(&self, event: RecorderEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    struct Harness {
        service: RecorderService,
        source: Arc<FakeSource>,
        store: Arc<MemoryStore>,
        sink: Arc<CollectingSink>,
    }

    /// Holds up the first `recording: true` status event until released, so
    /// another command can race the publishing tick.
    #[derive(Default)]
    struct StallingSink {
        events: std::sync::Mutex<Vec<RecorderEvent>>,
        entered: tokio::sync::Notify,
        stalled: AtomicBool,
    }

    impl NotificationSink for StallingSink {
        fn publish(&self, event: RecorderEvent) {
            let starting = matches!(event, RecorderEvent::ChangeRecordStatus { recording: true, .. });
            if starting && !self.stalled.swap(true, Ordering::SeqCst) {
                self.entered.notify_one();
                std::thread::sleep(Duration::from_millis(100));
            }
            self.events.lock().unwrap().push(event);
        }
    }

    fn config(mode: RecordingMode) -> RecorderConfig {
        let mut config = RecorderConfig::default();
        config.sampling.mode = mode;
        config
    }

    async fn harness_with(mode: RecordingMode, store: MemoryStore) -> Harness {
        let config = config(mode);
        let source = Arc::new(FakeSource::default());
        let store = Arc::new(store);
        let sink = Arc::new(CollectingSink::default());
        let service =
            RecorderService::initialize(&config, source.clone(), store.clone(), sink.clone()).await;
        Harness {
            service,
            source,
            store,
            sink,
        }
    }

    async fn harness(mode: RecordingMode) -> Harness {
        harness_with(mode, MemoryStore::default()).await
    }

    fn count(events: &[RecorderEvent], name: &str) -> usize {
        events.iter().filter(|e| e.name() == name).count()
    }

    #[tokio::test]
    async fn test_automatic_recording_end_to_end() {
        let h = harness(RecordingMode::Automatic).await;
        h.source.sail(35.0, 12.0, 7.2, 180.0);

        let outcome = h.service.tick().await.unwrap();
        assert!(outcome.is_valid(), "{:?}", outcome.rejections);
        h.service.flush().await;

        let events = h.sink.take();
        assert_eq!(count(&events, "changeRecordStatus"), 1);
        assert_eq!(count(&events, "polarUpdated"), 1);
        assert_eq!(count(&events, "updateLivePerformance"), 1);
        assert_eq!(count(&events, "recordErrors"), 0);

        let updated = events.iter().find(|e| e.name() == "polarUpdated").unwrap();
        let RecorderEvent::PolarUpdated {
            file,
            angle,
            speed,
            boat_speed,
            previous,
            ..
        } = updated
        else {
            unreachable!()
        };
        assert_eq!(file, AUTO_FILE);
        assert_eq!((*angle, *speed), (35.0, 12.0));
        assert_relative_eq!(*boat_speed, 7.2, epsilon = 1e-9);
        assert_eq!(*previous, None);

        let saved = h.store.table(AUTO_FILE).unwrap();
        assert_relative_eq!(saved.get(35.0, 12.0).unwrap().boat_speed_kt, 7.2, epsilon = 1e-9);
        assert!(h.service.state().await.recording_active);
    }

    #[tokio::test]
    async fn test_motoring_stops_recording_once() {
        let h = harness(RecordingMode::Automatic).await;
        h.source.sail(35.0, 12.0, 7.2, 180.0);
        h.service.tick().await.unwrap();
        h.sink.take();

        h.source.engine("started");
        assert!(h.service.refresh_motoring().await.unwrap());
        assert!(h.service.refresh_motoring().await.unwrap());
        let outcome = h.service.tick().await.unwrap();

        let events = h.sink.take();
        assert_eq!(
            events[..2],
            [
                RecorderEvent::ChangeMotoringStatus { motoring: true },
                RecorderEvent::ChangeRecordStatus {
                    recording: false,
                    mode: RecordingMode::Automatic,
                    file: AUTO_FILE.to_string(),
                },
            ]
        );
        assert_eq!(count(&events, "changeRecordStatus"), 1);
        assert_eq!(count(&events, "changeMotoringStatus"), 1);
        assert!(events.contains(&RecorderEvent::RecordErrors {
            errors: vec!["engine running".to_string()]
        }));
        assert!(outcome.merge.is_none());
        assert!(h.service.state().await.motoring);
    }

    #[tokio::test]
    async fn test_rejections_reported_on_change() {
        let h = harness(RecordingMode::Automatic).await;

        h.service.tick().await.unwrap();
        h.service.tick().await.unwrap();
        let events = h.sink.take();
        assert_eq!(count(&events, "recordErrors"), 1);
        let RecorderEvent::RecordErrors { errors } = &events[0] else {
            panic!("expected recordErrors, got {:?}", events[0]);
        };
        assert_eq!(errors[0], "TWA reading missing");

        h.source.sail(90.0, 10.0, 6.0, 0.0);
        h.service.tick().await.unwrap();
        let events = h.sink.take();
        assert!(events.contains(&RecorderEvent::RecordErrors { errors: vec![] }));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_table_and_reports() {
        let store = MemoryStore::default();
        store.fail_saves.store(true, Ordering::SeqCst);
        let h = harness_with(RecordingMode::Automatic, store).await;
        h.source.sail(35.0, 12.0, 7.2, 180.0);

        h.service.tick().await.unwrap();
        h.service.flush().await;

        let events = h.sink.take();
        let reported = events.iter().any(|e| {
            matches!(e, RecorderEvent::RecordErrors { errors }
                if errors.iter().any(|m| m.contains("failed to save auto-recording-polar.json")))
        });
        assert!(reported, "{events:?}");
        assert!(h.store.table(AUTO_FILE).is_none());

        let in_memory = h.service.polar_data(Some(AUTO_FILE)).await.unwrap();
        assert!(in_memory.get(35.0, 12.0).is_some());
    }

    #[tokio::test]
    async fn test_malformed_baseline_starts_empty() {
        let store = MemoryStore {
            corrupt: HashSet::from(["polar-data.json".to_string()]),
            ..MemoryStore::default()
        };
        let h = harness_with(RecordingMode::Manual, store).await;

        let events = h.sink.take();
        assert_eq!(count(&events, "recordErrors"), 1);
        assert!(h.service.polar_data(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_start_with_selected_file() {
        let store = MemoryStore::default();
        let mut race = PolarTable::new();
        race.merge(&PolarGrid::default(), 90.0, 10.0, 6.5, Utc::now()).unwrap();
        store.tables.lock().unwrap().insert("race.json".into(), race);
        let h = harness_with(RecordingMode::Manual, store).await;

        let state = h
            .service
            .set_recording_active(true, Some("race.json".into()))
            .await
            .unwrap();
        assert!(state.recording_active);
        assert_eq!(state.active_file, "race.json");
        assert_eq!(h.service.polar_data(None).await.unwrap().len(), 1);

        h.source.sail(90.0, 10.0, 7.0, 0.0);
        let outcome = h.service.tick().await.unwrap();
        assert!(outcome.merge.unwrap().updated);
        h.service.flush().await;
        assert_relative_eq!(
            h.store.table("race.json").unwrap().get(90.0, 10.0).unwrap().boat_speed_kt,
            7.0,
            epsilon = 1e-9
        );

        let stopped = h.service.set_recording_active(false, None).await.unwrap();
        assert!(!stopped.recording_active);
        assert_eq!(count(&h.sink.take(), "changeRecordStatus"), 2);
    }

    #[tokio::test]
    async fn test_user_commands_validated() {
        let h = harness(RecordingMode::Automatic).await;

        let err = h.service.set_recording_active(true, None).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<RecordingError>(),
            Some(&RecordingError::AutomaticMode)
        );

        h.service.set_recording_mode(RecordingMode::Manual).await;
        let err = h
            .service
            .set_recording_active(true, Some("../etc/passwd".into()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::InvalidFileName(_))
        ));

        h.source.engine("started");
        h.service.refresh_motoring().await.unwrap();
        let err = h.service.set_recording_active(true, None).await.unwrap_err();
        assert_eq!(err.downcast_ref::<RecordingError>(), Some(&RecordingError::Motoring));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_status_events_follow_state_changes() {
        let source = Arc::new(FakeSource::default());
        let sink = Arc::new(StallingSink::default());
        let service = RecorderService::initialize(
            &config(RecordingMode::Automatic),
            source.clone(),
            Arc::new(MemoryStore::default()),
            sink.clone(),
        )
        .await;
        source.sail(35.0, 12.0, 7.2, 180.0);

        let ticking = {
            let service = service.clone();
            tokio::spawn(async move { service.tick().await })
        };
        sink.entered.notified().await;
        service.set_motoring(true).await;
        ticking.await.unwrap().unwrap();

        let statuses: Vec<bool> = sink
            .events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                RecorderEvent::ChangeRecordStatus { recording, .. } => Some(*recording),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![true, false]);
        assert!(!service.state().await.recording_active);
    }

    #[tokio::test]
    async fn test_import_lands_after_pending_save() {
        let store = MemoryStore::default();
        store.slow_saves.store(true, Ordering::SeqCst);
        let h = harness_with(RecordingMode::Manual, store).await;
        h.service.set_recording_active(true, None).await.unwrap();
        h.source.sail(90.0, 10.0, 6.0, 0.0);
        assert!(h.service.tick().await.unwrap().merge.unwrap().updated);

        let mut imported = PolarTable::new();
        imported.merge(&PolarGrid::default(), 45.0, 8.0, 5.0, Utc::now()).unwrap();
        h.service.import("polar-data.json", imported.clone()).await.unwrap();
        h.service.flush().await;

        let in_memory = h.service.polar_data(None).await.unwrap();
        assert_eq!(in_memory, imported);
        assert_eq!(h.store.table("polar-data.json").unwrap(), in_memory);
    }

    #[tokio::test]
    async fn test_failed_import_save_is_returned() {
        let store = MemoryStore::default();
        store.fail_saves.store(true, Ordering::SeqCst);
        let h = harness_with(RecordingMode::Manual, store).await;

        let err = h.service.import("light-air.json", PolarTable::new()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Io { .. })));
    }

    #[tokio::test]
    async fn test_import_replaces_live_baseline() {
        let h = harness(RecordingMode::Manual).await;
        let mut imported = PolarTable::new();
        imported.merge(&PolarGrid::default(), 60.0, 8.0, 5.0, Utc::now()).unwrap();
        imported.merge(&PolarGrid::default(), 120.0, 8.0, 6.0, Utc::now()).unwrap();

        assert_eq!(h.service.import("polar-data.json", imported).await.unwrap(), 2);
        assert_eq!(h.service.polar_data(None).await.unwrap().len(), 2);
        assert_eq!(h.store.table("polar-data.json").unwrap().len(), 2);

        let live = LiveData {
            twa_deg: -62.0,
            tws_kt: 8.0,
            stw_kt: 5.5,
        };
        let comparison = h.service.compare(&live).await;
        assert_eq!(comparison.expected_kt, 5.0);
    }

    #[tokio::test]
    async fn test_create_and_list_files() {
        let h = harness(RecordingMode::Manual).await;
        h.service.create_file("light-air.json").await.unwrap();
        let err = h.service.create_file("light-air.json").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::AlreadyExists(_))
        ));
        assert!(h.service.create_file("notes.txt").await.is_err());
        assert_eq!(h.service.list_files().await.unwrap(), vec!["light-air.json"]);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let h = harness(RecordingMode::Automatic).await;
        let _held = h.service.tick_guard.lock().await;
        assert!(h.service.tick().await.is_none());
    }

    #[tokio::test]
    async fn test_sampler_stops_on_shutdown() {
        let h = harness(RecordingMode::Automatic).await;
        h.source.sail(35.0, 12.0, 7.2, 180.0);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let service = h.service.clone();
        let sampler = tokio::spawn(async move { service.run_sampler(shutdown_rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), sampler)
            .await
            .unwrap()
            .unwrap();
        // the first interval tick fires immediately
        assert!(h.service.live().await.is_some());
    }
}
