mod availability;
mod conflict;
mod error;
mod guard;
mod mutations;
mod overlap;
mod queries;
mod slots;
mod transform;

pub use availability::{annotate, compute_availability};
pub use error::{EngineError, PlanError, Violation};
pub use guard::{structural_violations, validate_booking, WriteMode};
pub use overlap::{find_conflict, overlaps};
pub use slots::generate;
pub use transform::{transform, ENABLED_MARKER};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedOfficeState = Arc<RwLock<OfficeState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                flush_and_respond(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    pub state: DashMap<Ulid, SharedOfficeState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: booking id → office id
    pub(super) booking_to_office: DashMap<Ulid, Ulid>,
    /// Serializes every write that can make two active bookings overlap.
    /// Holding it across check + append is the exclusion constraint.
    pub(super) commit_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

/// Apply an event directly to an OfficeState (no locking; caller holds the lock).
fn apply_to_office(os: &mut OfficeState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::OfficeRenamed { name, .. } => os.name = name.clone(),
        Event::WorkingPlanReplaced { working_plan, .. } => {
            os.working_plan = working_plan.clone();
        }
        Event::BookingPlaced { booking } => {
            index.insert(booking.id, booking.office_id);
            os.insert_booking(booking.clone());
        }
        Event::BookingRescheduled { id, span, .. } => {
            if let Some(mut booking) = os.remove_booking(*id) {
                booking.span = *span;
                os.insert_booking(booking);
            }
        }
        Event::BookingStatusChanged { id, status, .. } => {
            if let Some(booking) = os.bookings.iter_mut().find(|b| b.id == *id) {
                booking.status = *status;
            }
        }
        // OfficeCreated/Deleted are handled at the DashMap level, not here
        Event::OfficeCreated { .. } | Event::OfficeDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let mut wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            booking_to_office: DashMap::new(),
            commit_lock: Mutex::new(()),
            clock,
        };

        // Replay: we're the sole owner of these Arcs, so try_write always
        // succeeds. Never block here, we may already be inside a runtime.
        for event in &events {
            match event {
                Event::OfficeCreated { id, name, working_plan } => {
                    let os = OfficeState::new(*id, name.clone(), working_plan.clone());
                    engine.state.insert(*id, Arc::new(RwLock::new(os)));
                }
                Event::OfficeDeleted { id } => engine.forget_office(id),
                other => {
                    if let Some(entry) = engine.state.get(&other.office_id()) {
                        let os = entry.clone();
                        let mut guard = os.try_write().expect("replay: uncontended write");
                        apply_to_office(&mut guard, other, &engine.booking_to_office);
                    }
                }
            }
        }
        let live = engine.state.len() + engine.booking_to_office.len();
        wal.carry_over(events.len().saturating_sub(live) as u64);
        tokio::spawn(wal_writer_loop(wal, wal_rx));
        tracing::info!(
            "replayed {} events: {} offices, {} bookings",
            events.len(),
            engine.state.len(),
            engine.booking_to_office.len()
        );

        Ok(engine)
    }

    /// Current local time according to the engine's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_office_state(&self, id: &Ulid) -> Option<SharedOfficeState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn office_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_office.get(booking_id).map(|e| *e.value())
    }

    /// Snapshot of every office handle, so no DashMap guard is held across an await.
    pub(super) fn office_handles(&self) -> Vec<SharedOfficeState> {
        self.state.iter().map(|e| e.value().clone()).collect()
    }

    /// WAL-append + apply + notify in one call.
    pub(super) async fn persist_and_apply(
        &self,
        os: &mut OfficeState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_office(os, event, &self.booking_to_office);
        self.notify.send(os.id, event);
        Ok(())
    }

    /// Lookup booking → office, acquire the office write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<OfficeState>, EngineError> {
        let office_id = self
            .office_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let os = self
            .get_office_state(&office_id)
            .ok_or(EngineError::NotFound(office_id))?;
        Ok(os.write_owned().await)
    }

    fn forget_office(&self, id: &Ulid) {
        if let Some((_, os)) = self.state.remove(id)
            && let Ok(guard) = os.try_read()
        {
            for b in &guard.bookings {
                self.booking_to_office.remove(&b.id);
            }
        }
    }
}
