use std::collections::BTreeSet;
use std::sync::Arc;

use crate::controller::NetworkController;
use crate::error::NetError;
use crate::net::{FlowId, FlowIdDispenser, Network, NodeId};
use crate::sim::{ExecOutcome, NetworkEvent, SimTime, Workload};
use crate::units::DataRate;

fn ms(v: u64) -> SimTime {
    SimTime::from_millis(v)
}

fn mbps(v: f64) -> DataRate {
    DataRate::from_mbps(v)
}

fn star_network() -> (Network, [NodeId; 3]) {
    let gbit = mbps(1000.0);
    let mut net = Network::new();
    let s = net.add_switch("s", gbit, 4);
    let hosts = [
        net.add_host("a", gbit),
        net.add_host("b", gbit),
        net.add_host("c", gbit),
    ];
    for h in hosts {
        net.connect(h, s).unwrap();
    }
    (net, hosts)
}

fn controller() -> (NetworkController, [NodeId; 3]) {
    let (net, hosts) = star_network();
    (NetworkController::new(net), hosts)
}

#[test]
fn events_run_in_deadline_order() {
    let (mut ctrl, [a, b, c]) = controller();
    ctrl.claim_node(a).unwrap();
    ctrl.claim_node(b).unwrap();
    let d = Arc::clone(ctrl.dispenser());
    let mut builder = Workload::builder(&d);
    builder
        .flow_update(ms(5), a, c, mbps(100.0))
        .flow_update(ms(1), b, c, mbps(100.0))
        .flow_update(ms(3), a, b, mbps(100.0));
    let mut wl = builder.build().unwrap();

    assert_eq!(wl.size(), 3);
    assert_eq!(wl.start_instant(), ms(1));
    assert_eq!(wl.end_instant(), ms(5));

    let mut seen = Vec::new();
    while wl.has_next() {
        let at = wl.peek_deadline().unwrap();
        assert_eq!(wl.exec_next(&mut ctrl).unwrap(), ExecOutcome::Executed);
        assert_eq!(ctrl.now(), at);
        seen.push(at);
    }
    assert_eq!(seen, vec![ms(1), ms(3), ms(5)]);
    assert!(wl.is_empty());
    assert!(matches!(
        wl.exec_next(&mut ctrl),
        Err(NetError::NoEventsRemaining)
    ));
}

#[test]
fn same_deadline_keeps_insertion_order() {
    let (mut ctrl, [a, _, c]) = controller();
    ctrl.claim_node(a).unwrap();
    let d = Arc::clone(ctrl.dispenser());
    let mut builder = Workload::builder(&d);
    let id = builder.flow_start(ms(1), a, c, mbps(100.0));
    builder
        .flow_change_rate(ms(1), id, mbps(300.0))
        .flow_change_rate(ms(1), id, mbps(200.0));
    let mut wl = builder.build().unwrap();

    let stats = wl.exec_all(&mut ctrl);
    assert_eq!(stats.executed, 3);
    assert_eq!(ctrl.flow(id).unwrap().desired_rate(), mbps(200.0));
}

#[test]
fn passed_deadlines_are_dropped() {
    let (mut ctrl, [a, _, c]) = controller();
    ctrl.claim_node(a).unwrap();
    ctrl.advance_by(ms(10));

    let d = Arc::clone(ctrl.dispenser());
    let mut builder = Workload::builder(&d);
    builder.flow_start(ms(5), a, c, mbps(100.0));
    builder.flow_start(ms(15), a, c, mbps(100.0));
    let mut wl = builder.build().unwrap();

    let energy_before = ctrl.energy_recorder().total_consumption();
    assert_eq!(wl.exec_next(&mut ctrl).unwrap(), ExecOutcome::Dropped);
    assert_eq!(ctrl.now(), ms(10));
    assert_eq!(ctrl.network().num_flows(), 0);
    // 丢弃事件不推进时钟，也不积分能量
    assert_eq!(ctrl.energy_recorder().total_consumption(), energy_before);

    assert_eq!(wl.exec_next(&mut ctrl).unwrap(), ExecOutcome::Executed);
    assert_eq!(ctrl.now(), ms(15));
    assert_eq!(ctrl.network().num_flows(), 1);
}

#[test]
fn rejected_events_are_counted_apart_from_executed_ones() {
    let (mut ctrl, [a, b, c]) = controller();
    ctrl.claim_node(a).unwrap();
    let d = Arc::clone(ctrl.dispenser());
    let mut builder = Workload::builder(&d);
    let id = builder.flow_start(ms(1), a, c, mbps(100.0));
    // b 未被占用，不存在的流无法停止
    builder.flow_start(ms(2), b, c, mbps(100.0));
    builder
        .flow_stop(ms(3), FlowId(99))
        .flow_stop(ms(4), id);
    let mut wl = builder.build().unwrap();

    assert_eq!(wl.exec_next(&mut ctrl).unwrap(), ExecOutcome::Executed);
    assert_eq!(wl.exec_next(&mut ctrl).unwrap(), ExecOutcome::Rejected);
    // 被拒绝的事件仍然把时钟推进到其截止时间
    assert_eq!(ctrl.now(), ms(2));

    let stats = wl.exec_all(&mut ctrl);
    assert_eq!(stats.executed, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.consumed(), 2);
    assert_eq!(ctrl.network().num_flows(), 0);
}

#[test]
fn exec_until_is_strict_and_advances_the_clock() {
    let (mut ctrl, [a, b, c]) = controller();
    ctrl.claim_node(a).unwrap();
    ctrl.claim_node(b).unwrap();
    let d = Arc::clone(ctrl.dispenser());
    let mut builder = Workload::builder(&d);
    builder
        .flow_update(ms(1), a, c, mbps(10.0))
        .flow_update(ms(2), b, c, mbps(10.0))
        .flow_update(ms(3), a, b, mbps(10.0));
    let mut wl = builder.build().unwrap();

    let stats = wl.exec_until(&mut ctrl, ms(2));
    assert_eq!(stats.executed, 1);
    assert_eq!(wl.len(), 2);
    assert_eq!(ctrl.now(), ms(2));

    let stats = wl.exec_until(&mut ctrl, ms(3));
    assert_eq!(stats.consumed(), 1);
    assert_eq!(wl.len(), 1);
    assert_eq!(ctrl.now(), ms(3));

    // 目标时刻早于当前时刻时不回拨时钟
    let stats = wl.exec_until(&mut ctrl, ms(1));
    assert_eq!(stats.consumed(), 0);
    assert_eq!(ctrl.now(), ms(3));
}

#[test]
fn update_only_workload_is_optimized_into_start_and_change_rate() {
    let (net, [a, b, c]) = star_network();
    let d = Arc::new(FlowIdDispenser::new());
    let mut ctrl = NetworkController::with_dispenser(net, Arc::clone(&d));
    ctrl.claim_node(a).unwrap();
    ctrl.claim_node(b).unwrap();

    let mut builder = Workload::builder(&d);
    builder
        .flow_update(ms(0), a, c, mbps(100.0))
        .flow_update(ms(1), a, c, mbps(200.0))
        .flow_update(ms(1), b, c, mbps(50.0))
        .flow_update(ms(2), a, c, mbps(0.0));
    let wl = builder.build().unwrap();
    assert_eq!(d.peek(), FlowId(0));

    let mut wl = wl.optimize(&d);
    assert_eq!(wl.size(), 4);
    // 每个 (from, to) 只预留一个 id
    assert_eq!(d.peek(), FlowId(2));

    wl.exec_until(&mut ctrl, ms(2));
    let f0 = ctrl.flow(FlowId(0)).unwrap();
    assert_eq!((f0.transmitter(), f0.destination()), (a, c));
    assert_eq!(f0.desired_rate(), mbps(200.0));
    let f1 = ctrl.flow(FlowId(1)).unwrap();
    assert_eq!((f1.transmitter(), f1.destination()), (b, c));

    wl.exec_all(&mut ctrl);
    assert_eq!(ctrl.flow(FlowId(0)).unwrap().desired_rate(), DataRate::ZERO);
    assert_eq!(ctrl.network().num_flows(), 2);
}

#[test]
fn mixed_workload_is_not_optimized() {
    let d = FlowIdDispenser::new();
    let mut builder = Workload::builder(&d);
    let id = builder.flow_start(ms(0), NodeId(0), NodeId(1), mbps(1.0));
    builder.flow_update(ms(1), NodeId(1), NodeId(0), mbps(1.0));
    builder.flow_stop(ms(2), id);
    let wl = builder.build().unwrap();

    let wl = wl.optimize(&d);
    assert_eq!(wl.size(), 3);
    assert_eq!(d.peek(), FlowId(1));
}

#[test]
fn host_ids_are_inferred_from_events() {
    let d = FlowIdDispenser::new();
    let mut builder = Workload::builder(&d);
    builder
        .flow_update(ms(0), NodeId(0), NodeId(1), mbps(1.0))
        .flow_update(ms(0), NodeId(2), NodeId(3), mbps(1.0))
        .core(NodeId(3));
    let wl = builder.build().unwrap();

    assert_eq!(wl.host_ids(), &BTreeSet::from([NodeId(0), NodeId(1), NodeId(2)]));
    assert_eq!(wl.core_ids(), &BTreeSet::from([NodeId(3)]));
    assert_eq!(wl.transmitters(), BTreeSet::from([NodeId(0), NodeId(2)]));
    assert_eq!(wl.involved_ids().len(), 4);
}

#[test]
fn host_and_core_ids_must_not_overlap() {
    let err = Workload::new(
        Vec::new(),
        BTreeSet::from([NodeId(1)]),
        BTreeSet::from([NodeId(1)]),
    )
    .unwrap_err();
    assert!(matches!(err, NetError::InvalidWorkload(_)));
}

#[test]
fn explicit_flow_ids_are_observed_by_the_dispenser() {
    let d = FlowIdDispenser::new();
    let mut builder = Workload::builder(&d);
    builder.event(
        ms(0),
        NetworkEvent::FlowStart {
            from: NodeId(0),
            to: NodeId(1),
            rate: mbps(1.0),
            flow_id: Some(FlowId(9)),
        },
    );
    let next = builder.flow_start(ms(1), NodeId(0), NodeId(1), mbps(1.0));
    assert_eq!(next, FlowId(10));

    let wl = builder.build().unwrap();
    let text = wl.describe();
    assert!(text.contains("| num of network events: 2"));
    assert!(text.contains("| start instant: 0ms"));
}
