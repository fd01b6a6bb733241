use std::sync::{Arc, Mutex};

use crate::controller::{ManualTimeSource, NetworkController};
use crate::error::NetError;
use crate::net::{FlowId, Network, NodeId};
use crate::sim::{SimTime, Workload};
use crate::topo::{FatTreeOpts, build_fat_tree};
use crate::units::{DataRate, Power};

fn mbps(v: f64) -> DataRate {
    DataRate::from_mbps(v)
}

fn star() -> (NetworkController, [NodeId; 3], NodeId) {
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
    (NetworkController::new(net), hosts, s)
}

#[test]
fn hosts_are_claimed_in_id_order() {
    let (mut ctrl, [a, b, c], s) = star();
    assert_eq!(ctrl.claim_next_host_node(), Some(a));
    assert_eq!(ctrl.claim_next_node(), Some(b));
    assert_eq!(ctrl.claim_next_host_node(), Some(c));
    assert_eq!(ctrl.claim_next_host_node(), None);
    assert_eq!(ctrl.claim_next_core_node(), None);
    assert_eq!(ctrl.claim_next_node(), None);

    assert!(matches!(ctrl.claim_node(a), Err(NetError::AlreadyClaimed(_))));
    assert!(matches!(ctrl.claim_node(s), Err(NetError::NotEndpoint(_))));
    assert!(matches!(
        ctrl.claim_node(NodeId(99)),
        Err(NetError::NodeNotFound(_))
    ));
    assert_eq!(ctrl.claimed_nodes().len(), 3);
}

#[test]
fn core_switches_are_claimable_after_hosts() {
    let mut net = Network::new();
    let topo = build_fat_tree(&mut net, &FatTreeOpts::default()).unwrap();
    let mut ctrl = NetworkController::new(net);

    assert_eq!(ctrl.claim_next_core_node(), Some(topo.core_switches[0]));
    for _ in 0..topo.hosts.len() {
        ctrl.claim_next_node().unwrap();
    }
    assert!(topo.hosts.iter().all(|&h| ctrl.is_claimed(h)));
    assert_eq!(ctrl.claim_next_node(), Some(topo.core_switches[1]));
    assert!(matches!(
        ctrl.claim_node(topo.tor_switches[0]),
        Err(NetError::NotEndpoint(_))
    ));
}

#[test]
fn start_flow_validates_before_touching_the_network() {
    let (mut ctrl, [a, b, c], s) = star();

    assert!(matches!(
        ctrl.start_flow(a, c, mbps(10.0), None, None),
        Err(NetError::NotClaimed(_))
    ));
    ctrl.claim_node(a).unwrap();
    assert!(matches!(
        ctrl.start_flow(a, s, mbps(10.0), None, None),
        Err(NetError::NotEndpoint(_))
    ));
    assert!(matches!(
        ctrl.start_flow(a, c, mbps(-10.0), None, None),
        Err(NetError::NegativeRate(_))
    ));
    assert_eq!(ctrl.network().num_flows(), 0);

    let id = ctrl.start_flow(a, c, mbps(10.0), None, None).unwrap();
    assert_eq!(id, FlowId(0));
    assert!(matches!(
        ctrl.start_flow(a, b, mbps(10.0), Some(id), None),
        Err(NetError::DuplicateFlowId(_))
    ));

    let explicit = ctrl.start_flow(a, b, mbps(10.0), Some(FlowId(5)), None).unwrap();
    assert_eq!(explicit, FlowId(5));
    assert_eq!(ctrl.start_flow(a, b, mbps(1.0), None, None).unwrap(), FlowId(6));
    assert!(ctrl.check_consistency());
}

#[test]
fn start_or_update_reuses_the_existing_flow() {
    let (mut ctrl, [a, _, c], _) = star();
    ctrl.claim_node(a).unwrap();

    let first = ctrl.start_or_update_flow(a, c, mbps(100.0)).unwrap();
    let second = ctrl.start_or_update_flow(a, c, mbps(300.0)).unwrap();
    assert_eq!(first, second);
    assert_eq!(ctrl.network().num_flows(), 1);
    assert_eq!(ctrl.flow(first).unwrap().granted_rate(), mbps(300.0));

    assert!(ctrl.stop_flow(first));
    assert!(!ctrl.stop_flow(first));
    assert!(ctrl.set_flow_rate(first, mbps(1.0)).is_err());
}

#[test]
fn rate_change_callback_can_be_attached_later() {
    let (mut ctrl, [a, b, c], _) = star();
    ctrl.claim_node(a).unwrap();
    ctrl.claim_node(b).unwrap();

    let id = ctrl.start_flow(a, c, mbps(800.0), None, None).unwrap();
    let rates: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rates);
    ctrl.on_rate_change(id, Box::new(move |_, _, new| sink.lock().unwrap().push(new.mbps())))
        .unwrap();

    ctrl.start_flow(b, c, mbps(800.0), None, None).unwrap();
    let rates = rates.lock().unwrap();
    assert_eq!(rates.len(), 1);
    assert!((rates[0] - 500.0).abs() < 1e-6);
    assert!(ctrl
        .on_rate_change(FlowId(77), Box::new(|_, _, _| {}))
        .is_err());
}

#[test]
fn advance_by_integrates_energy() {
    let (mut ctrl, _, _) = star();
    let p = ctrl.energy_recorder().current_consumption().watts();
    ctrl.advance_by(SimTime::from_secs(3));

    assert_eq!(ctrl.now(), SimTime::from_secs(3));
    assert_eq!(ctrl.last_update(), SimTime::from_secs(3));
    let e = ctrl.energy_recorder().total_consumption().joules();
    assert!((e - 3.0 * p).abs() < 1e-9);
}

#[test]
fn sync_follows_an_external_time_source() {
    let (mut ctrl, _, _) = star();
    assert!(matches!(ctrl.sync(), Err(NetError::NoTimeSource)));

    let src = ManualTimeSource::new(SimTime::ZERO);
    ctrl.set_time_source(Box::new(src.clone()));
    src.advance(SimTime::from_secs(1));
    assert_eq!(ctrl.now(), SimTime::from_secs(1));

    assert_eq!(ctrl.sync().unwrap(), SimTime::from_secs(1));
    assert_eq!(ctrl.last_update(), SimTime::from_secs(1));
    assert_eq!(ctrl.sync().unwrap(), SimTime::ZERO);

    src.set(SimTime::from_millis(500));
    assert!(matches!(
        ctrl.sync(),
        Err(NetError::TimeWentBackwards { .. })
    ));

    assert!(ctrl.clear_time_source().is_some());
    assert!(matches!(ctrl.sync(), Err(NetError::NoTimeSource)));
}

#[test]
fn virtual_ids_are_mapped_to_physical_hosts() {
    let (mut ctrl, [a, b, c], _) = star();
    let d = Arc::clone(ctrl.dispenser());
    let mut builder = Workload::builder(&d);
    let f0 = builder.flow_start(SimTime::ZERO, NodeId(100), NodeId(101), mbps(100.0));
    let f1 = builder.flow_start(SimTime::ZERO, NodeId(102), NodeId(101), mbps(100.0));
    let wl = builder.build().unwrap();

    let stats = ctrl.exec_workload(wl, true).unwrap();
    assert_eq!(stats.executed, 2);
    assert_eq!(ctrl.mapped_or_self(NodeId(100)), a);
    assert_eq!(ctrl.mapped_or_self(NodeId(101)), b);
    assert_eq!(ctrl.mapped_or_self(NodeId(102)), c);
    assert_eq!(ctrl.mapped_or_self(NodeId(7)), NodeId(7));

    let flow = ctrl.flow(f0).unwrap();
    assert_eq!((flow.transmitter(), flow.destination()), (a, b));
    let flow = ctrl.flow(f1).unwrap();
    assert_eq!((flow.transmitter(), flow.destination()), (c, b));
}

#[test]
fn virtual_mapping_fails_without_enough_hosts() {
    let (mut ctrl, _, _) = star();
    let d = Arc::clone(ctrl.dispenser());
    let mut builder = Workload::builder(&d);
    for i in 0..4 {
        builder.flow_update(SimTime::ZERO, NodeId(10 + i), NodeId(20 + i), mbps(1.0));
    }
    let wl = builder.build().unwrap();
    assert!(matches!(
        ctrl.exec_workload(wl, true),
        Err(NetError::InvalidWorkload(_))
    ));
}

#[test]
fn physical_workload_claims_its_transmitters() {
    let (mut ctrl, [a, b, c], _) = star();
    let d = Arc::clone(ctrl.dispenser());
    let mut builder = Workload::builder(&d);
    builder
        .flow_update(SimTime::ZERO, a, c, mbps(100.0))
        .flow_update(SimTime::from_millis(1), b, c, mbps(100.0));
    let wl = builder.build().unwrap();

    let stats = ctrl.exec_workload(wl, false).unwrap();
    assert_eq!(stats.executed, 2);
    assert!(ctrl.is_claimed(a) && ctrl.is_claimed(b));
    assert!(!ctrl.is_claimed(c));
    assert_eq!(ctrl.network().num_flows(), 2);
}

#[test]
fn snapshot_summarizes_flows_and_energy() {
    let (mut ctrl, [a, b, c], _) = star();
    ctrl.claim_node(a).unwrap();
    ctrl.claim_node(b).unwrap();
    ctrl.start_flow(a, c, mbps(800.0), None, None).unwrap();
    ctrl.start_flow(b, c, mbps(200.0), None, None).unwrap();
    ctrl.advance_by(SimTime::from_secs(1));

    let snap = ctrl.snapshot();
    assert_eq!(snap.instant, SimTime::from_secs(1));
    assert_eq!(snap.num_nodes, 4);
    assert_eq!(snap.num_host_nodes, 3);
    assert_eq!(snap.claimed_host_nodes, 2);
    assert_eq!(snap.num_core_switches, 0);
    assert_eq!(snap.num_active_flows, 2);
    assert!(snap.total_throughput.approx_eq(mbps(1000.0)));
    assert!(snap.total_demand.approx_eq(mbps(1000.0)));
    assert_eq!(snap.satisfied_ratio, Some(1.0));
    assert!((snap.total_energy.joules() - snap.current_power.watts()).abs() < 1e-9);

    let text = snap.describe();
    assert_eq!(text.lines().count(), 2);
    assert!(ctrl.fmt_flows().lines().count() == 3);
}

#[test]
fn empty_network_snapshot_has_no_ratios() {
    let (ctrl, _, _) = star();
    let snap = ctrl.snapshot();
    assert_eq!(snap.num_active_flows, 0);
    assert_eq!(snap.total_throughput_ratio, None);
    assert_eq!(snap.avg_throughput_ratio, None);
    assert_eq!(snap.satisfied_ratio, None);
}

#[test]
fn internal_time_never_moves_backwards() {
    let (mut ctrl, _, _) = star();
    ctrl.set_internal_time(SimTime::from_millis(20));
    assert_eq!(ctrl.now(), SimTime::from_millis(20));
    assert_eq!(ctrl.last_update(), SimTime::from_millis(20));

    ctrl.advance_by(SimTime::from_millis(5));
    ctrl.set_internal_time(SimTime::from_millis(10));
    assert_eq!(ctrl.now(), SimTime::from_millis(25));
    assert_eq!(ctrl.last_update(), SimTime::from_millis(25));
}

#[test]
fn unclaimable_transmitters_leave_their_events_rejected() {
    let (mut ctrl, [a, _, c], s) = star();
    let d = Arc::clone(ctrl.dispenser());
    let mut builder = Workload::builder(&d);
    builder
        .flow_update(SimTime::ZERO, a, c, mbps(100.0))
        .flow_update(SimTime::from_millis(1), s, c, mbps(100.0));
    let wl = builder.build().unwrap();

    let stats = ctrl.exec_workload(wl, false).unwrap();
    assert_eq!(stats.executed, 1);
    assert_eq!(stats.rejected, 1);
    assert!(ctrl.is_claimed(a));
    assert!(!ctrl.is_claimed(s));
    assert_eq!(ctrl.network().num_flows(), 1);
}

#[test]
fn node_snapshots_count_flows_per_role() {
    let (mut ctrl, [a, b, c], s) = star();
    ctrl.claim_node(a).unwrap();
    ctrl.claim_node(b).unwrap();
    ctrl.start_flow(a, c, mbps(800.0), None, None).unwrap();
    ctrl.start_flow(b, c, mbps(800.0), None, None).unwrap();

    // 交换机转发两条流，各得一半瓶颈带宽
    let sw = ctrl.node_snapshot(s).unwrap();
    assert_eq!((sw.flows_in, sw.flows_out), (2, 2));
    assert_eq!((sw.generated, sw.consumed), (0, 0));
    for r in [sw.min_throughput_ratio, sw.max_throughput_ratio, sw.avg_throughput_ratio] {
        assert!((r.unwrap() - 0.625).abs() < 1e-9);
    }
    assert!((sw.total_throughput_ratio.unwrap() - 0.625).abs() < 1e-9);
    assert!(sw.current_power.watts() > 0.0);

    let tx = ctrl.node_snapshot(a).unwrap();
    assert_eq!((tx.flows_in, tx.flows_out, tx.generated, tx.consumed), (0, 1, 1, 0));
    assert_eq!(tx.current_power, Power::ZERO);

    let rx = ctrl.node_snapshot(c).unwrap();
    assert_eq!((rx.flows_in, rx.flows_out, rx.generated, rx.consumed), (2, 0, 0, 2));
    assert_eq!(rx.avg_throughput_ratio, None);
    assert_eq!(rx.total_throughput_ratio, None);
    assert_eq!(rx.describe().lines().count(), 2);

    assert_eq!(ctrl.node_snapshots().len(), 4);
    assert!(matches!(
        ctrl.node_snapshot(NodeId(42)),
        Err(NetError::NodeNotFound(_))
    ));
}
