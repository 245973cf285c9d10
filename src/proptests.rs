// src/proptests.rs

use std::collections::HashSet;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use proptest::prelude::*;

use crate::counter::{Counter, CounterAttr, Domain};
use crate::error::Result;
use crate::op::{OpExecutor, SendOp, TriggeredOp};
use crate::trigger::Trigger;
use crate::types::{Context, EndpointId, FabricAddr, IoBuf, OpFlags};

/// A dispatch as seen from inside the executor.
#[derive(Debug, Clone, Copy)]
struct Fired {
    threshold: u64,
    value: u64,
    index: u64,
    next_pending: Option<u64>,
}

#[derive(Default)]
struct Log {
    fired: Mutex<Vec<Fired>>,
    cntr: OnceLock<Weak<Counter>>,
}

impl OpExecutor for Log {
    fn send(&self, op: &SendOp) -> Result<()> {
        let Some(cntr) = self.cntr.get().and_then(Weak::upgrade) else {
            return Ok(());
        };
        self.fired.lock().push(Fired {
            threshold: op.dest_addr.0,
            value: cntr.read(),
            index: op.context.0,
            next_pending: cntr.next_trigger_threshold(),
        });
        Ok(())
    }
}

impl Domain for Log {
    fn progress(&self) {}
}

#[derive(Debug, Clone)]
enum Step {
    Add(u64),
    Set(u64),
    Trigger(u64),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u64..20).prop_map(Step::Add),
        (0u64..200).prop_map(Step::Set),
        (0u64..200).prop_map(Step::Trigger),
    ]
}

fn trigger(threshold: u64, index: u64) -> Trigger {
    Trigger::new(
        threshold,
        TriggeredOp::Send(SendOp {
            ep: EndpointId(0),
            buf: IoBuf::default(),
            desc: None,
            // Echo the threshold back to the executor.
            dest_addr: FabricAddr(threshold),
            context: Context(index),
            flags: OpFlags::empty(),
        }),
    )
}

proptest! {
    #[test]
    fn value_follows_adds_and_sets(steps in proptest::collection::vec(arb_step(), 0..64)) {
        let cntr = Counter::open(Arc::new(Log::default()), &CounterAttr::default()).unwrap();
        let mut expected = 0u64;
        for step in &steps {
            match *step {
                Step::Add(d) => { cntr.add(d).unwrap(); expected += d; }
                Step::Set(v) => { cntr.set(v).unwrap(); expected = v; }
                Step::Trigger(_) => {}
            }
            prop_assert_eq!(cntr.read(), expected);
        }
    }

    #[test]
    fn triggers_fire_in_order_once_satisfied(steps in proptest::collection::vec(arb_step(), 0..64)) {
        let log = Arc::new(Log::default());
        let cntr = Arc::new(Counter::open(log.clone(), &CounterAttr::default()).unwrap());
        log.cntr.set(Arc::downgrade(&cntr)).unwrap();

        let mut queued = 0u64;
        for step in &steps {
            match *step {
                Step::Add(d) => cntr.add(d).unwrap(),
                Step::Set(v) => cntr.set(v).unwrap(),
                Step::Trigger(t) => {
                    cntr.add_trigger(trigger(t, queued));
                    queued += 1;
                }
            }
        }

        let fired = log.fired.lock().clone();
        let mut seen = HashSet::new();
        for f in &fired {
            prop_assert!(f.value >= f.threshold);
            // Nothing with a lower threshold is left behind a dispatched trigger.
            prop_assert!(f.next_pending.map_or(true, |next| next >= f.threshold));
            prop_assert!(seen.insert(f.index), "trigger {} fired twice", f.index);
        }
        prop_assert_eq!(fired.len() + cntr.pending_triggers(), queued as usize);
    }
}
