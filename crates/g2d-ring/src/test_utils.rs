//! In-process device model for tests.
//!
//! Available to other crates behind the `test-utils` feature. It is not part of the stable API.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use g2d_protocol::GpuAddr;

use crate::channel::{ContextHandle, IndirectBuffer, SubmitChannel, Timestamp};
use crate::error::DeviceError;

/// A submission as the fake device saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub context: ContextHandle,
    pub gpuaddr: GpuAddr,
    pub host_addr: usize,
    pub size_dwords: u32,
    pub timestamp: Timestamp,
    /// Copy of the command stream up to the ring cursor at submit time.
    pub words: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeCall {
    CreateContext,
    DestroyContext,
    Submit,
    Wait,
    ReadRetired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRecord {
    pub requested: Timestamp,
    pub retired: Timestamp,
    pub result: Result<(), DeviceError>,
}

#[derive(Debug)]
struct State {
    next_context: u32,
    live_contexts: Vec<ContextHandle>,
    submissions: Vec<RecordedSubmission>,
    waits: Vec<WaitRecord>,
    issued: Timestamp,
    retired: Timestamp,
    wait_latency: u32,
    polls_remaining: u32,
    faults: Vec<(FakeCall, DeviceError)>,
}

/// Fake submission channel. Clones share state, so a test can keep a handle while a ring owns
/// another.
///
/// Submissions are assigned consecutive timestamps. After a submission, the first
/// `wait_latency` calls to `wait_timestamp` for an unretired timestamp report
/// [`DeviceError::Busy`]; the next one retires everything issued so far.
#[derive(Debug, Clone)]
pub struct FakeDevice {
    state: Arc<Mutex<State>>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                next_context: 1,
                live_contexts: Vec::new(),
                submissions: Vec::new(),
                waits: Vec::new(),
                issued: Timestamp(0),
                retired: Timestamp(0),
                wait_latency: 0,
                polls_remaining: 0,
                faults: Vec::new(),
            })),
        }
    }

    /// Number of busy polls each submission needs before it retires.
    pub fn with_wait_latency(self, polls: u32) -> Self {
        self.lock().wait_latency = polls;
        self
    }

    /// Fails the next `call` with `err`. Faults for the same call are consumed in order.
    pub fn inject_fault(&self, call: FakeCall, err: DeviceError) {
        self.lock().faults.push((call, err));
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.lock().submissions.clone()
    }

    pub fn waits(&self) -> Vec<WaitRecord> {
        self.lock().waits.clone()
    }

    pub fn live_contexts(&self) -> Vec<ContextHandle> {
        self.lock().live_contexts.clone()
    }

    pub fn retired(&self) -> Timestamp {
        self.lock().retired
    }

    pub fn issued(&self) -> Timestamp {
        self.lock().issued
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn take_fault(&mut self, call: FakeCall) -> Result<(), DeviceError> {
        match self.faults.iter().position(|(c, _)| *c == call) {
            Some(i) => Err(self.faults.remove(i).1),
            None => Ok(()),
        }
    }
}

impl SubmitChannel for FakeDevice {
    fn create_context(&mut self) -> Result<ContextHandle, DeviceError> {
        let mut state = self.lock();
        state.take_fault(FakeCall::CreateContext)?;
        let ctx = ContextHandle(state.next_context);
        state.next_context += 1;
        state.live_contexts.push(ctx);
        Ok(ctx)
    }

    fn destroy_context(&mut self, ctx: ContextHandle) -> Result<(), DeviceError> {
        let mut state = self.lock();
        state.take_fault(FakeCall::DestroyContext)?;
        match state.live_contexts.iter().position(|c| *c == ctx) {
            Some(i) => {
                state.live_contexts.remove(i);
                Ok(())
            }
            None => Err(DeviceError::Rejected(format!("unknown context {}", ctx.0))),
        }
    }

    fn submit(
        &mut self,
        ctx: ContextHandle,
        ib: &IndirectBuffer<'_>,
    ) -> Result<Timestamp, DeviceError> {
        let mut state = self.lock();
        state.take_fault(FakeCall::Submit)?;
        if !state.live_contexts.contains(&ctx) {
            return Err(DeviceError::Rejected(format!("unknown context {}", ctx.0)));
        }
        if ib.size_dwords == 0 || ib.size_dwords as usize > ib.words.len() {
            return Err(DeviceError::Rejected(format!(
                "bad ib size {} for {} dwords",
                ib.size_dwords,
                ib.words.len()
            )));
        }
        let ts = Timestamp(state.issued.0.wrapping_add(1));
        state.issued = ts;
        state.polls_remaining = state.wait_latency;
        state.submissions.push(RecordedSubmission {
            context: ctx,
            gpuaddr: ib.gpuaddr,
            host_addr: ib.host_addr,
            size_dwords: ib.size_dwords,
            timestamp: ts,
            words: ib.words.to_vec(),
        });
        Ok(ts)
    }

    fn wait_timestamp(
        &mut self,
        ts: Timestamp,
        _timeout: Option<Duration>,
    ) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let result = state.take_fault(FakeCall::Wait).and_then(|()| {
            if !ts.is_retired_by(state.issued) {
                return Err(DeviceError::Rejected(format!(
                    "timestamp {} was never issued",
                    ts.0
                )));
            }
            if ts.is_retired_by(state.retired) {
                return Ok(());
            }
            if state.polls_remaining > 0 {
                state.polls_remaining -= 1;
                return Err(DeviceError::Busy);
            }
            state.retired = state.issued;
            Ok(())
        });
        let retired = state.retired;
        state.waits.push(WaitRecord {
            requested: ts,
            retired,
            result: result.clone(),
        });
        result
    }

    fn read_retired_timestamp(&mut self) -> Result<Timestamp, DeviceError> {
        let mut state = self.lock();
        state.take_fault(FakeCall::ReadRetired)?;
        Ok(state.retired)
    }
}
