//! Delivery of commands to the device.
//!
//! The dispatcher keeps at most one live command per [`CommandSlot`]. Every attempt writes the
//! payload and reads back the characteristic that reflects it, so convergence is noticed even for
//! values the device does not notify. Retries are driven by [`Dispatcher::tick`], which the
//! supervisor calls at [`Dispatcher::next_deadline`]. Because the supervisor is the only caller,
//! a command that was cancelled or superseded is gone before the next tick can see it.

use indexmap::IndexMap;
use log::{debug, info, warn};
use tokio::time::Instant;

use crate::command::policy::policy;
use crate::command::types::{
    CancelReason, Command, CommandEvent, CommandOutcome, CommandSlot, CommandState, PendingCommand,
};
use crate::control::events::EventBus;
use crate::device::constants::RETRY_INTERVAL;
use crate::device::store::DeviceStore;
use crate::device::transport::Transport;
use crate::device::types::{DeviceEvent, DeviceState};
use crate::error::{CommandAbandoned, TransportError};

pub struct Dispatcher {
    pending: IndexMap<CommandSlot, PendingCommand>,
    bus: EventBus,
}

impl Dispatcher {
    pub fn new(bus: EventBus) -> Self {
        Dispatcher { pending: IndexMap::new(), bus }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(&self, slot: CommandSlot) -> Option<&PendingCommand> {
        self.pending.get(&slot)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().filter_map(|pending| pending.next_attempt_at).min()
    }

    /// Replaces any live command in the same slot and makes the first attempt. A returned error
    /// has already been accounted for by the policy; it is only handed back so the caller can
    /// check the link.
    pub async fn submit<T: Transport + ?Sized>(
        &mut self,
        command: Command,
        transport: &T,
        store: &mut DeviceStore,
        now: Instant,
    ) -> Result<(), TransportError> {
        let slot = command.kind().slot();
        if let Some(previous) = self.pending.shift_remove(&slot) {
            self.finish(previous, CommandOutcome::Cancelled(CancelReason::Superseded));
        }

        info!("Command {} issued: {:?}", command.id, command.intent);
        self.pending.insert(slot, PendingCommand::new(command, now));
        self.attempt(slot, transport, store, now).await
    }

    /// Completes a command without writing anything.
    pub fn reject(&mut self, command: Command, reason: CancelReason) {
        let slot = command.kind().slot();
        if let Some(previous) = self.pending.shift_remove(&slot) {
            self.finish(previous, CommandOutcome::Cancelled(CancelReason::Superseded));
        }

        let pending = PendingCommand::new(command, Instant::now());
        self.finish(pending, CommandOutcome::Cancelled(reason));
    }

    /// Runs every command whose next attempt is due.
    pub async fn tick<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        store: &mut DeviceStore,
        now: Instant,
    ) -> Result<(), TransportError> {
        let due: Vec<CommandSlot> = self.pending
            .iter()
            .filter(|(_, pending)| pending.next_attempt_at.map_or(false, |at| at <= now))
            .map(|(slot, _)| *slot)
            .collect();

        let mut result = Ok(());
        for slot in due {
            // an earlier attempt in this tick may have settled this command through its read-back
            let pending = match self.pending.get(&slot) {
                Some(pending) => pending,
                None => continue,
            };

            let state = store.snapshot();
            let intent = pending.command.intent;
            let command_policy = policy(intent.kind());

            if intent.is_satisfied_by(&state) {
                self.complete(slot, CommandOutcome::Confirmed);
            } else if !command_policy.retries() {
                self.complete(slot, CommandOutcome::Abandoned(CommandAbandoned::NotConfirmed));
            } else if !(command_policy.retry_while)(&state) {
                self.complete(slot, CommandOutcome::Cancelled(CancelReason::PreconditionLost));
            } else {
                debug!("Retrying command {} (attempt {})", pending.command.id, pending.attempt_count + 1);
                if let Err(err) = self.attempt(slot, transport, store, now).await {
                    result = Err(err);
                }
            }
        }

        result
    }

    /// Checks every live command against the state. Called after each store update.
    pub fn reconcile(&mut self, state: &DeviceState) {
        let slots: Vec<CommandSlot> = self.pending.keys().copied().collect();

        for slot in slots {
            let intent = match self.pending.get(&slot) {
                Some(pending) => pending.command.intent,
                None => continue,
            };

            let command_policy = policy(intent.kind());
            if intent.is_satisfied_by(state) {
                self.complete(slot, CommandOutcome::Confirmed);
            } else if command_policy.retries() && !(command_policy.retry_while)(state) {
                self.complete(slot, CommandOutcome::Cancelled(CancelReason::PreconditionLost));
            }
        }
    }

    /// Cancels every live command. Nothing is resumed afterwards.
    pub fn purge(&mut self, reason: CancelReason) {
        if !self.pending.is_empty() {
            info!("Cancelling {} pending command(s): {:?}", self.pending.len(), reason);
        }

        for (_, pending) in std::mem::take(&mut self.pending) {
            self.finish(pending, CommandOutcome::Cancelled(reason));
        }
    }

    async fn attempt<T: Transport + ?Sized>(
        &mut self,
        slot: CommandSlot,
        transport: &T,
        store: &mut DeviceStore,
        now: Instant,
    ) -> Result<(), TransportError> {
        let (command, retries) = match self.pending.get_mut(&slot) {
            Some(pending) => {
                pending.attempt_count += 1;
                pending.last_attempt_at = Some(now);
                (pending.command.clone(), policy(pending.command.kind()).retries())
            },
            None => return Ok(()),
        };

        if let Err(err) = transport.write_characteristic(command.characteristic.uuid(), &command.payload).await {
            warn!("Write for command {} failed: {}", command.id, err);

            if retries {
                self.schedule(slot, now, CommandState::Retrying);
            } else {
                let reason = CommandAbandoned::WriteFailed { message: err.to_string() };
                self.complete(slot, CommandOutcome::Abandoned(reason));
            }
            return Err(err);
        }

        let readback = command.intent.readback();
        match transport.read_characteristic(readback.uuid()).await {
            Ok(bytes) => {
                if let Err(err) = store.apply_notification(readback.uuid(), &bytes) {
                    warn!("Discarding read-back of {:?}: {}", readback, err);
                }
            },
            Err(err) => debug!("Read-back of {:?} failed: {}", readback, err),
        }

        self.reconcile(&store.snapshot());

        // single attempt commands get one interval for the device to confirm the value
        let state = if retries { CommandState::Retrying } else { CommandState::Issued };
        self.schedule(slot, now, state);
        Ok(())
    }

    fn schedule(&mut self, slot: CommandSlot, now: Instant, state: CommandState) {
        if let Some(pending) = self.pending.get_mut(&slot) {
            let interval = policy(pending.command.kind()).interval.unwrap_or(RETRY_INTERVAL);
            pending.state = state;
            pending.next_attempt_at = Some(now + interval);
        }
    }

    fn complete(&mut self, slot: CommandSlot, outcome: CommandOutcome) {
        if let Some(pending) = self.pending.shift_remove(&slot) {
            self.finish(pending, outcome);
        }
    }

    fn finish(&self, mut pending: PendingCommand, outcome: CommandOutcome) {
        pending.state = outcome.state();
        pending.next_attempt_at = None;

        match &outcome {
            CommandOutcome::Confirmed => info!("Command {} confirmed after {} attempt(s)", pending.command.id, pending.attempt_count),
            CommandOutcome::Abandoned(reason) => warn!("Command {} abandoned: {}", pending.command.id, reason),
            CommandOutcome::Cancelled(reason) => info!("Command {} cancelled: {:?}", pending.command.id, reason),
        }

        self.bus.publish(DeviceEvent::Command(CommandEvent {
            id: pending.command.id,
            intent: pending.command.intent,
            outcome,
            attempts: pending.attempt_count,
        }));
    }
}
