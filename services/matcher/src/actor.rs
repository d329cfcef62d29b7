//! Per-pair actor
//!
//! Single writer for one asset pair's book. Requests are processed to
//! completion, one at a time: validation (with a deadline), the match
//! loop, then per-event commit (journal append first, history second,
//! so a crash between the two is healed by idempotent replay). Each
//! fill's exchange transaction must be admitted by the UTX pool before
//! the next event commits; a refusal rolls the submitted order back out
//! without advancing the counter.

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task;
use tokio::time::timeout;
use tracing::{error, info, warn};

use order_history::OrderHistory;
use persistence::{
    recover, BookSnapshot, EventApplier, EventJournal, JournalConfig, SnapshotStore,
};
use types::assets::AssetPair;
use types::errors::MatcherError;
use types::events::Event;
use types::limit_order::LimitOrder;
use types::order::{Order, OrderId, OrderSide, PublicKey};

use crate::book::OrderBook;
use crate::matching;
use crate::script::ScriptVerifier;
use crate::settings::MatcherSettings;
use crate::tx::{build_exchange_transaction, ExchangeTransaction, UtxPool};
use crate::validation::{Clock, OrderValidator};

/// Mailbox capacity of one pair actor.
const MAILBOX_SIZE: usize = 256;

/// Shared dependencies of every pair actor.
#[derive(Clone)]
pub struct MatcherContext {
    pub settings: Arc<MatcherSettings>,
    pub history: Arc<OrderHistory>,
    pub validator: Arc<OrderValidator>,
    pub scripts: ScriptVerifier,
    pub utx: Arc<dyn UtxPool>,
    pub matcher_key: Arc<SigningKey>,
    pub clock: Arc<dyn Clock>,
    pub transactions: broadcast::Sender<ExchangeTransaction>,
}

/// Requests a pair actor understands.
pub enum PairRequest {
    Place {
        order: Box<Order>,
        reply: oneshot::Sender<PairResponse>,
    },
    Cancel {
        sender: PublicKey,
        order_id: OrderId,
        reply: oneshot::Sender<PairResponse>,
    },
    /// Expiry sweep; side effects only.
    Cleanup,
    GetOrders {
        side: Option<OrderSide>,
        reply: oneshot::Sender<Vec<LimitOrder>>,
    },
    /// Drop in-memory state and reload from snapshot + journal.
    Restart,
}

#[derive(Debug)]
pub enum PairResponse {
    OrderAccepted(Box<Order>),
    OrderRejected(MatcherError),
    OrderCanceled(String),
    OrderCancelRejected(MatcherError),
    OperationTimedOut,
}

/// Aggregated ladder view published for read-only queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookDepth {
    pub bids: Vec<(u64, u64)>,
    pub asks: Vec<(u64, u64)>,
}

/// Handle to a running pair actor.
#[derive(Clone)]
pub struct PairHandle {
    pub pair: AssetPair,
    pub sender: mpsc::Sender<PairRequest>,
}

pub struct PairActor {
    pair: AssetPair,
    pair_key: String,
    ctx: MatcherContext,
    book: OrderBook,
    journal: EventJournal,
    snapshots: SnapshotStore,
    snapshot_policy: persistence::snapshot::SnapshotPolicy,
    depths: Arc<dashmap::DashMap<String, BookDepth>>,
}

impl PairActor {
    /// Recover state and start the actor task.
    pub fn spawn(
        pair: AssetPair,
        ctx: MatcherContext,
        depths: Arc<dashmap::DashMap<String, BookDepth>>,
    ) -> Result<PairHandle, MatcherError> {
        let pair_key = pair.key();
        let (book, next_sequence, snapshots) = Self::recover_state(&ctx, &pair_key)?;

        let journal_dir = ctx.settings.journal_dir.join(&pair_key);
        let mut journal = EventJournal::open(JournalConfig::new(journal_dir))
            .map_err(|e| MatcherError::Internal(e.to_string()))?;
        journal.set_next_sequence(next_sequence);

        let mut snapshot_policy =
            persistence::snapshot::SnapshotPolicy::new(ctx.settings.snapshot_interval);
        snapshot_policy.record(next_sequence.saturating_sub(1));

        let actor = PairActor {
            pair: pair.clone(),
            pair_key,
            ctx,
            book,
            journal,
            snapshots,
            snapshot_policy,
            depths,
        };

        let (sender, receiver) = mpsc::channel(MAILBOX_SIZE);
        tokio::spawn(actor.run(receiver));
        Ok(PairHandle { pair, sender })
    }

    fn recover_state(
        ctx: &MatcherContext,
        pair_key: &str,
    ) -> Result<(OrderBook, u64, SnapshotStore), MatcherError> {
        let snapshots = SnapshotStore::new(
            ctx.settings.snapshot_dir.join(pair_key),
            ctx.settings.snapshot_compression,
        );
        let journal_dir = ctx.settings.journal_dir.join(pair_key);

        let mut applier = BookRebuild {
            book: OrderBook::new(),
            history: &ctx.history,
            pair_key,
        };
        let report = recover(&snapshots, &journal_dir, &mut applier)
            .map_err(|e| MatcherError::Internal(e.to_string()))?;
        info!(
            pair = pair_key,
            snapshot = report.snapshot_sequence,
            replayed = report.replayed,
            "pair state recovered"
        );
        Ok((applier.book, report.final_sequence + 1, snapshots))
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<PairRequest>) {
        info!(pair = %self.pair_key, "pair actor started");
        self.publish_depth();

        while let Some(request) = mailbox.recv().await {
            let outcome = match request {
                PairRequest::Place { order, reply } => {
                    let result = self.handle_place(*order).await;
                    Self::respond(reply, result)
                }
                PairRequest::Cancel {
                    sender,
                    order_id,
                    reply,
                } => {
                    let result = self.handle_cancel(sender, order_id);
                    Self::respond(reply, result)
                }
                PairRequest::Cleanup => self.handle_cleanup(),
                PairRequest::GetOrders { side, reply } => {
                    let orders = match side {
                        Some(side) => self.book.side_orders(side),
                        None => self.book.all_orders(),
                    };
                    let _ = reply.send(orders);
                    Ok(())
                }
                PairRequest::Restart => self.handle_restart(),
            };

            // Snapshots are taken only between requests, when the book
            // agrees with the journal
            let outcome = outcome
                .and_then(|()| self.maybe_snapshot(self.journal.next_sequence().saturating_sub(1)));

            self.publish_depth();

            if let Err(e) = outcome {
                // Persistence failure: die and let the supervisor
                // respawn us through recovery
                error!(pair = %self.pair_key, error = %e, "pair actor failed");
                break;
            }
        }
        info!(pair = %self.pair_key, "pair actor stopped");
    }

    fn respond(
        reply: oneshot::Sender<PairResponse>,
        result: Result<PairResponse, MatcherError>,
    ) -> Result<(), MatcherError> {
        match result {
            Ok(response) => {
                let _ = reply.send(response);
                Ok(())
            }
            Err(e) => {
                let _ = reply.send(PairResponse::OrderRejected(MatcherError::Internal(
                    e.to_string(),
                )));
                Err(e)
            }
        }
    }

    // ── Placement ───────────────────────────────────────────────────

    async fn handle_place(&mut self, order: Order) -> Result<PairResponse, MatcherError> {
        let validator = Arc::clone(&self.ctx.validator);
        let candidate = order.clone();
        let verdict = timeout(
            self.ctx.settings.validation_timeout(),
            task::spawn_blocking(move || validator.validate_place(&candidate)),
        )
        .await;

        let verdict = match verdict {
            Err(_) => {
                warn!(pair = %self.pair_key, order = %order.id(), "validation timed out");
                return Ok(PairResponse::OperationTimedOut);
            }
            Ok(Err(join)) => return Err(MatcherError::Internal(join.to_string())),
            Ok(Ok(verdict)) => verdict,
        };
        if let Err(reason) = verdict {
            return Ok(PairResponse::OrderRejected(reason));
        }

        let submitted_id = order.id();
        let mut pending = LimitOrder::new(order.clone());

        // Each round matches what is left of the submitted order. A
        // refused fill undoes the round's uncommitted book changes,
        // then either drops the invalid counter and retries, or drops
        // the submitted order and reports the rollback.
        'matching: loop {
            let events = matching::match_order(&mut self.book, pending.clone());

            for (idx, event) in events.iter().enumerate() {
                let Event::OrderExecuted {
                    submitted: sub,
                    counter,
                } = event
                else {
                    self.commit_event(event)?;
                    continue;
                };

                let tx = build_exchange_transaction(
                    sub,
                    counter,
                    self.ctx.settings.order_match_tx_fee,
                    self.ctx.clock.millis(),
                    &self.ctx.matcher_key,
                )?;

                let admitted = match self.ctx.scripts.verify_transaction(&tx) {
                    Err(e) => Err((self.blame_by_reverify(counter), e.to_string())),
                    Ok(()) => self.ctx.utx.accept(&tx).map_err(|rejection| {
                        let counter_at_fault = rejection.invalid_order == Some(counter.id());
                        (counter_at_fault, rejection.reason)
                    }),
                };

                match admitted {
                    Ok(()) => {
                        // The fill stands: only now does it enter the
                        // journal and history
                        self.commit_event(event)?;
                        let _ = self.ctx.transactions.send(tx);
                    }
                    Err((counter_at_fault, cause)) => {
                        self.undo_uncommitted(submitted_id, &events[idx..]);

                        if counter_at_fault {
                            // Drop the invalid counter and let the
                            // submitted order keep matching
                            warn!(
                                pair = %self.pair_key,
                                counter = %counter.id(),
                                cause,
                                "counter order refused, removing it"
                            );
                            let removed = self.book.remove(&counter.id());
                            if let Some(removed) = removed {
                                self.commit_event(&Event::OrderCanceled {
                                    order: removed,
                                    unmatchable: false,
                                })?;
                            }
                            pending = sub.clone();
                            continue 'matching;
                        }

                        warn!(
                            pair = %self.pair_key,
                            order = %submitted_id,
                            cause,
                            "fill refused, rolling back submitted order"
                        );
                        self.book.remove(&submitted_id);
                        self.commit_event(&Event::OrderCanceled {
                            order: sub.clone(),
                            unmatchable: true,
                        })?;
                        return Ok(PairResponse::OrderRejected(
                            MatcherError::MatchingRolledBack {
                                order_id: submitted_id,
                                cause,
                            },
                        ));
                    }
                }
            }

            break;
        }

        Ok(PairResponse::OrderAccepted(Box::new(order)))
    }

    /// Whether the counter order itself fails order-level verification;
    /// if it does, a transaction-level script denial is its fault.
    fn blame_by_reverify(&self, counter: &LimitOrder) -> bool {
        self.ctx.scripts.verify_order(counter.order()).is_err()
    }

    /// Undo the book mutations of events that never committed,
    /// restoring every counter to its pre-execution state.
    fn undo_uncommitted(&mut self, submitted_id: OrderId, events: &[Event]) {
        let mut restored: std::collections::HashSet<OrderId> = std::collections::HashSet::new();
        for event in events {
            match event {
                Event::OrderExecuted { counter, .. } => {
                    self.book.remove(&counter.id());
                    restored.insert(counter.id());
                    self.book.insert(counter.clone());
                }
                Event::OrderAdded { order } if order.id() == submitted_id => {
                    self.book.remove(&submitted_id);
                }
                Event::OrderCanceled { order, unmatchable }
                    if *unmatchable
                        && order.id() != submitted_id
                        && !restored.contains(&order.id()) =>
                {
                    // Dust removal that never committed
                    self.book.insert(order.clone());
                }
                _ => {}
            }
        }
    }

    // ── Cancel / cleanup / restart ──────────────────────────────────

    fn handle_cancel(
        &mut self,
        sender: PublicKey,
        order_id: OrderId,
    ) -> Result<PairResponse, MatcherError> {
        if let Err(reason) = self.ctx.validator.validate_cancel(&order_id, &sender) {
            return Ok(PairResponse::OrderCancelRejected(reason));
        }
        match matching::cancel_order(&mut self.book, &order_id) {
            Some(event) => {
                self.commit_event(&event)?;
                Ok(PairResponse::OrderCanceled(order_id.to_string()))
            }
            None => Ok(PairResponse::OrderCancelRejected(
                MatcherError::cancel_rejected("Order not found"),
            )),
        }
    }

    fn handle_cleanup(&mut self) -> Result<(), MatcherError> {
        let now = self.ctx.clock.millis();
        for event in matching::expire_orders(&mut self.book, now) {
            self.commit_event(&event)?;
        }
        Ok(())
    }

    fn handle_restart(&mut self) -> Result<(), MatcherError> {
        self.journal
            .sync()
            .map_err(|e| MatcherError::Internal(e.to_string()))?;
        let (book, next_sequence, snapshots) = Self::recover_state(&self.ctx, &self.pair_key)?;
        self.book = book;
        self.snapshots = snapshots;

        let journal_dir = self.ctx.settings.journal_dir.join(&self.pair_key);
        let mut journal = EventJournal::open(JournalConfig::new(journal_dir))
            .map_err(|e| MatcherError::Internal(e.to_string()))?;
        journal.set_next_sequence(next_sequence);
        self.journal = journal;

        let mut policy =
            persistence::snapshot::SnapshotPolicy::new(self.ctx.settings.snapshot_interval);
        policy.record(next_sequence.saturating_sub(1));
        self.snapshot_policy = policy;
        Ok(())
    }

    // ── Commit path ─────────────────────────────────────────────────

    /// Journal first, then history: replay after a crash between the
    /// two re-applies the event, and the history watermark makes that a
    /// no-op when it already landed.
    fn commit_event(&mut self, event: &Event) -> Result<u64, MatcherError> {
        let sequence = self
            .journal
            .append_event(self.ctx.clock.millis(), event)
            .map_err(|e| MatcherError::Internal(e.to_string()))?;
        self.ctx
            .history
            .process(&self.pair_key, sequence, event)
            .map_err(|e| MatcherError::Internal(e.to_string()))?;
        Ok(sequence)
    }

    fn maybe_snapshot(&mut self, sequence: u64) -> Result<(), MatcherError> {
        if sequence == 0 || !self.snapshot_policy.should_snapshot(sequence) {
            return Ok(());
        }
        self.journal
            .sync()
            .map_err(|e| MatcherError::Internal(e.to_string()))?;
        let (bids, asks) = self.book.ladders();
        let snapshot = BookSnapshot::new(
            self.pair_key.clone(),
            sequence,
            self.ctx.clock.millis(),
            bids,
            asks,
        );
        self.snapshots
            .write(&snapshot)
            .map_err(|e| MatcherError::Internal(e.to_string()))?;
        self.snapshot_policy.record(sequence);
        Ok(())
    }

    fn publish_depth(&self) {
        self.depths.insert(
            self.pair_key.clone(),
            BookDepth {
                bids: self.book.bids.depth(usize::MAX),
                asks: self.book.asks.depth(usize::MAX),
            },
        );
    }
}

/// Recovery applier: rebuilds the book from facts and re-feeds history
/// (which skips already-applied sequences).
struct BookRebuild<'a> {
    book: OrderBook,
    history: &'a OrderHistory,
    pair_key: &'a str,
}

impl EventApplier for BookRebuild<'_> {
    fn restore(&mut self, snapshot: &BookSnapshot) -> Result<(), String> {
        self.book = OrderBook::restore(snapshot.bids.clone(), snapshot.asks.clone());
        Ok(())
    }

    fn apply(&mut self, sequence: u64, _timestamp: i64, event: &Event) -> Result<(), String> {
        matching::apply_event(&mut self.book, event);
        self.history
            .process(self.pair_key, sequence, event)
            .map_err(|e| e.to_string())
    }
}
