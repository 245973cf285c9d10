// Integration tests for counters, triggered operations and shm discovery.
//
// A small in-process "domain" plays the messaging collaborator: triggered
// sends land in a log and complete immediately against a second counter.

use fabric_shm::counter::{Control, ControlReply, Counter, CounterAttr, Domain, WaitObj};
use fabric_shm::info::{Hints, InfoFlags, MrMode, MsgOrder, TxAttr};
use fabric_shm::op::{OpExecutor, SendOp, TaggedRecvOp, TriggeredOp};
use fabric_shm::probe::{CachedProbe, CmaProbe, FixedProbe};
use fabric_shm::resolver::{resolve_address, ShmInfoResolver, StaticInfoSource};
use fabric_shm::trigger::Trigger;
use fabric_shm::types::{Context, EndpointId, FabricAddr, IoBuf, OpFlags};
use fabric_shm::{Error, Result};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Domain whose sends complete on `tx_cntr`.
#[derive(Default)]
struct LoopbackDomain {
    log: Mutex<Vec<(&'static str, u64)>>,
    tx_cntr: OnceLock<Arc<Counter>>,
}

impl OpExecutor for LoopbackDomain {
    fn send(&self, op: &SendOp) -> Result<()> {
        self.log.lock().push(("send", op.context.0));
        if let Some(cntr) = self.tx_cntr.get() {
            cntr.add(1)?;
        }
        Ok(())
    }

    fn tagged_recv(&self, op: &TaggedRecvOp) -> Result<()> {
        self.log.lock().push(("trecv", op.context.0));
        Ok(())
    }
}

impl Domain for LoopbackDomain {
    fn progress(&self) {}
}

fn send(threshold: u64, ctx: u64) -> Trigger {
    Trigger::new(
        threshold,
        TriggeredOp::Send(SendOp {
            ep: EndpointId(1),
            buf: IoBuf::new(0x4000, 128),
            desc: None,
            dest_addr: FabricAddr(0),
            context: Context(ctx),
            flags: OpFlags::COMPLETION,
        }),
    )
}

fn trecv(threshold: u64, ctx: u64) -> Trigger {
    Trigger::new(
        threshold,
        TriggeredOp::TaggedRecv(TaggedRecvOp {
            ep: EndpointId(1),
            buf: IoBuf::new(0x8000, 128),
            desc: None,
            src_addr: FabricAddr::UNSPEC,
            tag: 0xabc,
            ignore: 0xf,
            context: Context(ctx),
            flags: OpFlags::empty(),
        }),
    )
}

#[test]
fn threshold_scenario_dispatches_in_order() {
    init_tracing();
    let domain = Arc::new(LoopbackDomain::default());
    let cntr = Counter::open(domain.clone(), &CounterAttr::default()).unwrap();

    cntr.add_trigger(send(5, 0));
    cntr.add_trigger(trecv(3, 1));
    cntr.add_trigger(send(3, 2));
    cntr.add_trigger(send(8, 3));

    cntr.set(4).unwrap();
    assert_eq!(*domain.log.lock(), vec![("trecv", 1), ("send", 2)]);
    assert_eq!(cntr.next_trigger_threshold(), Some(5));

    cntr.set(10).unwrap();
    assert_eq!(
        *domain.log.lock(),
        vec![("trecv", 1), ("send", 2), ("send", 0), ("send", 3)]
    );
    cntr.close();
}

#[test]
fn chained_counters_wake_waiter() {
    init_tracing();
    let domain = Arc::new(LoopbackDomain::default());
    let rx = Arc::new(Counter::open(domain.clone(), &CounterAttr::default()).unwrap());
    let tx = Arc::new(
        Counter::open(
            domain.clone(),
            &CounterAttr {
                wait_obj: WaitObj::MutexCond,
                ..CounterAttr::default()
            },
        )
        .unwrap(),
    );
    assert!(domain.tx_cntr.set(tx.clone()).is_ok());

    // Each receive completion releases one send; sends complete on `tx`.
    for i in 1..=4 {
        rx.add_trigger(send(i, i));
    }

    let producer = {
        let rx = rx.clone();
        std::thread::spawn(move || {
            for _ in 0..4 {
                std::thread::sleep(Duration::from_millis(2));
                rx.add(1).unwrap();
            }
        })
    };

    tx.wait(4, Some(Duration::from_secs(10))).unwrap();
    producer.join().unwrap();
    assert_eq!(tx.read(), 4);
    assert_eq!(rx.pending_triggers(), 0);

    match tx.control(Control::GetWait).unwrap() {
        ControlReply::Wait(ws) => assert!(!ws.mutex().is_locked()),
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn concurrent_adds_fire_every_trigger_once() {
    init_tracing();
    let domain = Arc::new(LoopbackDomain::default());
    let cntr = Arc::new(Counter::open(domain.clone(), &CounterAttr::default()).unwrap());

    let threads: Vec<_> = (0..4u64)
        .map(|t| {
            let cntr = cntr.clone();
            std::thread::spawn(move || {
                for i in 0..250u64 {
                    cntr.add_trigger(send(t * 250 + i, t * 250 + i));
                    cntr.add(1).unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(cntr.read(), 1000);
    let mut fired: Vec<u64> = domain.log.lock().iter().map(|&(_, c)| c).collect();
    // The last trigger has threshold 999, so everything has fired.
    assert_eq!(fired.len(), 1000);
    fired.sort_unstable();
    fired.dedup();
    assert_eq!(fired.len(), 1000);
}

#[test]
fn mutex_cond_wait_reports_timeout() {
    let domain = Arc::new(LoopbackDomain::default());
    let cntr = Counter::open(
        domain,
        &CounterAttr {
            wait_obj: "mutex+condition".parse().unwrap(),
            ..CounterAttr::default()
        },
    )
    .unwrap();

    assert!(matches!(
        cntr.wait(10, Some(Duration::ZERO)),
        Err(Error::Timeout)
    ));
    cntr.wait(0, Some(Duration::ZERO)).unwrap();
}

#[test]
fn open_with_unsupported_wait_obj_fails() {
    let domain = Arc::new(LoopbackDomain::default());
    let attr = CounterAttr {
        wait_obj: "fd".parse().unwrap(),
        ..CounterAttr::default()
    };
    let err = Counter::open(domain.clone(), &attr).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(err.code(), -libc::EINVAL);
    assert_eq!(Arc::strong_count(&domain), 1);
}

#[test]
fn resolve_fills_addresses_and_normalizes() {
    init_tracing();
    let resolver = ShmInfoResolver::new(
        Arc::new(StaticInfoSource::shm()),
        Arc::new(FixedProbe(false)),
    );

    let infos = resolver
        .resolve(1, Some("h1"), Some("9999"), InfoFlags::empty(), None)
        .unwrap();
    for info in &infos {
        let dest = info.dest_addr.as_ref().unwrap();
        assert_eq!(dest.as_bytes(), b"fi_ns://h1:9999\0");
        assert_eq!(dest.len(), 16);
        assert_eq!(info.src_addr, Some(resolve_address(None, None)));
        assert_eq!(info.ep_attr.max_order_raw_size, 0);
        assert_eq!(info.ep_attr.max_order_waw_size, 0);
        assert_eq!(info.ep_attr.max_order_war_size, 0);
        assert_eq!(info.tx_attr.msg_order, MsgOrder::SAS);
    }
}

#[test]
fn fast_rma_override_applies_regardless_of_hints() {
    let resolver = ShmInfoResolver::new(
        Arc::new(StaticInfoSource::shm()),
        Arc::new(FixedProbe(false)),
    )
    .with_fast_rma(|_, _| true);

    let hints = Hints {
        tx_attr: Some(TxAttr {
            msg_order: MsgOrder::RAW | MsgOrder::WAW,
            inject_size: 0,
        }),
        ..Hints::default()
    };
    let infos = resolver
        .resolve(1, None, None, InfoFlags::empty(), Some(&hints))
        .unwrap();
    assert_eq!(infos[0].domain_attr.mr_mode, MrMode::VIRT_ADDR);
    assert_eq!(infos[0].ep_attr.max_order_raw_size, 0);
    assert_eq!(infos[0].ep_attr.max_order_waw_size, 0);
    assert_eq!(infos[0].ep_attr.max_order_war_size, 0);
}

#[test]
fn real_probe_feeds_resolver() {
    init_tracing();
    let probe = Arc::new(CachedProbe::new(CmaProbe::new(Duration::from_micros(200))));
    let resolver = ShmInfoResolver::new(Arc::new(StaticInfoSource::shm()), probe);

    // Whatever the host allows, discovery itself must succeed.
    let infos = resolver
        .resolve(1, None, None, InfoFlags::SOURCE, None)
        .unwrap();
    assert_eq!(infos.len(), 1);
    assert!(infos[0].dest_addr.is_none());
    assert!(infos[0].src_addr.is_some());
}
