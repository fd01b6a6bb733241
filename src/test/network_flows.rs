use std::sync::{Arc, Mutex};

use crate::error::NetError;
use crate::net::{FlowHashPort, FlowId, NetFlow, Network, NodeId, StaticEcmp};
use crate::units::DataRate;

fn gbit() -> DataRate {
    DataRate::from_mbps(1000.0)
}

/// a, b, c 都连到同一台 4 口交换机
fn star() -> (Network, [NodeId; 3], NodeId) {
    let mut net = Network::new();
    let s = net.add_switch("s", gbit(), 4);
    let a = net.add_host("a", gbit());
    let b = net.add_host("b", gbit());
    let c = net.add_host("c", gbit());
    for h in [a, b, c] {
        net.connect(h, s).unwrap();
    }
    (net, [a, b, c], s)
}

/// h0 - s1 = {s2, s3} = s4 - h1
fn diamond() -> (Network, NodeId, NodeId, [NodeId; 4]) {
    let mut net = Network::new();
    let h0 = net.add_host("h0", gbit());
    let s1 = net.add_switch("s1", gbit(), 4);
    let s2 = net.add_switch("s2", gbit(), 4);
    let s3 = net.add_switch("s3", gbit(), 4);
    let s4 = net.add_switch("s4", gbit(), 4);
    let h1 = net.add_host("h1", gbit());
    for (x, y) in [(h0, s1), (s1, s2), (s1, s3), (s2, s4), (s3, s4), (s4, h1)] {
        net.connect(x, y).unwrap();
    }
    (net, h0, h1, [s1, s2, s3, s4])
}

#[test]
fn flow_start_then_stop_restores_an_empty_network() {
    let (mut net, [a, _, c], s) = star();

    let id = net
        .start_flow(NetFlow::new(FlowId(7), a, c, DataRate::from_mbps(200.0)))
        .unwrap();
    assert_eq!(id, FlowId(7));
    assert_eq!(net.num_flows(), 1);
    assert_eq!(net.flow(id).unwrap().granted_rate(), DataRate::from_mbps(200.0));
    assert!(net.flows_through(s).unwrap().contains(&id));
    assert!(net.check_consistency().is_empty());

    let stopped = net.stop_flow(id).unwrap();
    assert_eq!(stopped.granted_rate(), DataRate::ZERO);
    assert_eq!(net.num_flows(), 0);
    assert!(net.links().iter().all(|l| l.num_subflows() == 0));
    assert!(net.nodes().all(|n| n.flow_table().is_empty()));

    assert!(matches!(net.stop_flow(id), Err(NetError::UnknownFlow(_))));
}

#[test]
fn starting_and_stopping_a_neighbour_leaves_a_running_flow_untouched() {
    let (mut net, h0, h1, switches) = diamond();
    let x = net
        .start_flow(NetFlow::new(FlowId(0), h0, h1, DataRate::from_mbps(600.0)))
        .unwrap();

    let links_before: Vec<_> = net.links().iter().map(|l| l.subflows().clone()).collect();
    let granted_before = net.flow(x).unwrap().granted_rate();
    let out_before: Vec<DataRate> = switches
        .iter()
        .map(|&s| net.node(s).unwrap().flow_table().out_rate_of(x))
        .collect();

    // 两条流共享瓶颈，x 在 y 存在期间被压低
    let y = net
        .start_flow(NetFlow::new(FlowId(1), h0, h1, DataRate::from_mbps(800.0)))
        .unwrap();
    assert!(net.flow(x).unwrap().granted_rate() < granted_before);
    net.stop_flow(y).unwrap();

    let links_after: Vec<_> = net.links().iter().map(|l| l.subflows().clone()).collect();
    assert_eq!(links_after, links_before);
    assert_eq!(net.flow(x).unwrap().granted_rate(), granted_before);
    let out_after: Vec<DataRate> = switches
        .iter()
        .map(|&s| net.node(s).unwrap().flow_table().out_rate_of(x))
        .collect();
    assert_eq!(out_after, out_before);
    assert!(net.check_consistency().is_empty());
}

#[test]
fn duplicate_flow_id_is_rejected_without_side_effects() {
    let (mut net, [a, b, c], _) = star();
    net.start_flow(NetFlow::new(FlowId(1), a, c, DataRate::from_mbps(100.0)))
        .unwrap();

    let err = net
        .start_flow(NetFlow::new(FlowId(1), b, c, DataRate::from_mbps(100.0)))
        .unwrap_err();
    assert!(matches!(err, NetError::DuplicateFlowId(FlowId(1))));
    assert_eq!(net.num_flows(), 1);
    assert_eq!(net.flow(FlowId(1)).unwrap().transmitter(), a);
}

#[test]
fn plain_switch_cannot_be_a_flow_endpoint() {
    let (mut net, [a, _, _], s) = star();
    let err = net
        .start_flow(NetFlow::new(FlowId(0), a, s, DataRate::from_mbps(1.0)))
        .unwrap_err();
    assert!(matches!(err, NetError::NotEndpoint(id) if id == s));

    let err = net
        .start_flow(NetFlow::new(FlowId(0), a, NodeId(99), DataRate::from_mbps(1.0)))
        .unwrap_err();
    assert!(matches!(err, NetError::NodeNotFound(NodeId(99))));
    assert_eq!(net.num_flows(), 0);
}

#[test]
fn competing_flows_get_max_min_fair_rates() {
    let (mut net, [a, b, c], s) = star();
    net.start_flow(NetFlow::new(FlowId(0), a, c, DataRate::from_mbps(300.0)))
        .unwrap();
    net.start_flow(NetFlow::new(FlowId(1), b, c, DataRate::from_mbps(900.0)))
        .unwrap();

    assert_eq!(net.flow(FlowId(0)).unwrap().granted_rate(), DataRate::from_mbps(300.0));
    assert!(net
        .flow(FlowId(1))
        .unwrap()
        .granted_rate()
        .approx_eq(DataRate::from_mbps(700.0)));

    let to_c = net.links_between(s, c).next().unwrap();
    assert!(to_c.load().approx_eq(gbit()));
    assert!(net.check_consistency().is_empty());

    // 降低 flow 1 的需求后 flow 0 不受影响，链路不再饱和
    net.set_desired_rate(FlowId(1), DataRate::from_mbps(100.0)).unwrap();
    assert_eq!(net.flow(FlowId(1)).unwrap().granted_rate(), DataRate::from_mbps(100.0));
    let to_c = net.links_between(s, c).next().unwrap();
    assert!(to_c.load().approx_eq(DataRate::from_mbps(400.0)));

    assert!(matches!(
        net.set_desired_rate(FlowId(1), DataRate::from_mbps(-1.0)),
        Err(NetError::NegativeRate(_))
    ));
}

#[test]
fn ecmp_splits_evenly_and_the_destination_receives_everything() {
    let (mut net, h0, h1, [s1, s2, s3, s4]) = diamond();
    let id = net
        .start_flow(NetFlow::new(FlowId(0), h0, h1, gbit()))
        .unwrap();

    let flow = net.flow(id).unwrap();
    assert!(flow.granted_rate().approx_eq(gbit()));

    let subs = net.node(s1).unwrap().flow_table().subflows_of(id);
    assert_eq!(subs.len(), 2);
    let hops: Vec<NodeId> = subs.iter().map(|s| s.next_hop).collect();
    assert_eq!(hops, vec![s2, s3]);
    for sub in subs {
        assert!(sub.rate.approx_eq(DataRate::from_mbps(500.0)));
    }
    let total: DataRate = subs.iter().map(|s| s.rate).sum();
    assert!(total.approx_eq(gbit()));

    // 两路在 s4 汇合
    let s4_out = net.node(s4).unwrap().flow_table().out_rate_of(id);
    assert!(s4_out.approx_eq(gbit()));
    let received = net.node(h1).unwrap().flow_table().receiving()[&id];
    assert!(received.approx_eq(gbit()));
    assert!(net.check_consistency().is_empty());
}

#[test]
fn ecmp_lets_a_flow_exceed_a_single_path_bottleneck() {
    let mut net = Network::new();
    let h0 = net.add_host("h0", DataRate::from_mbps(2000.0));
    let s1 = net.add_switch("s1", gbit(), 4);
    let s2 = net.add_switch("s2", gbit(), 4);
    let s3 = net.add_switch("s3", gbit(), 4);
    let s4 = net.add_switch("s4", gbit(), 4);
    let h1 = net.add_host("h1", DataRate::from_mbps(2000.0));
    net.connect_with_capacity(h0, s1, DataRate::from_mbps(2000.0))
        .unwrap();
    net.connect_with_capacity(s4, h1, DataRate::from_mbps(2000.0))
        .unwrap();
    for (x, y) in [(s1, s2), (s1, s3), (s2, s4), (s3, s4)] {
        net.connect(x, y).unwrap();
    }

    net.start_flow(NetFlow::new(FlowId(0), h0, h1, DataRate::from_mbps(1500.0)))
        .unwrap();
    assert!(net
        .flow(FlowId(0))
        .unwrap()
        .granted_rate()
        .approx_eq(DataRate::from_mbps(1500.0)));
}

#[test]
fn unreachable_destination_registers_a_zero_rate_flow() {
    let mut net = Network::new();
    let a = net.add_host("a", gbit());
    let b = net.add_host("b", gbit());

    let id = net
        .start_flow(NetFlow::new(FlowId(0), a, b, DataRate::from_mbps(10.0)))
        .unwrap();
    assert_eq!(net.num_flows(), 1);
    assert_eq!(net.flow(id).unwrap().granted_rate(), DataRate::ZERO);
    assert!(!net.flow(id).unwrap().is_satisfied());
}

#[test]
fn loopback_flow_gets_its_desired_rate() {
    let (mut net, [a, _, _], _) = star();
    net.start_flow(NetFlow::new(FlowId(0), a, a, DataRate::from_mbps(5000.0)))
        .unwrap();
    assert_eq!(net.flow(FlowId(0)).unwrap().granted_rate(), DataRate::from_mbps(5000.0));
    assert!(net.check_consistency().is_empty());
}

#[test]
fn rate_change_callbacks_fire_only_on_change() {
    let (mut net, [a, b, c], _) = star();
    let seen: Arc<Mutex<Vec<(FlowId, f64, f64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let flow = NetFlow::new(FlowId(0), a, c, DataRate::from_mbps(800.0)).with_rate_change_callback(
        Box::new(move |id, old, new| sink.lock().unwrap().push((id, old.mbps(), new.mbps()))),
    );
    net.start_flow(flow).unwrap();
    assert_eq!(seen.lock().unwrap().as_slice(), &[(FlowId(0), 0.0, 800.0)]);

    // 另一条流挤占瓶颈，flow 0 被压到 500
    net.start_flow(NetFlow::new(FlowId(1), b, c, DataRate::from_mbps(800.0)))
        .unwrap();
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!((seen[1].2 - 500.0).abs() < 1e-6);
    }

    // 不影响 flow 0 的重新分配不触发回调
    net.reallocate();
    assert_eq!(seen.lock().unwrap().len(), 2);

    net.stop_flow(FlowId(0)).unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[2].2, 0.0);
}

#[test]
fn transmitted_data_accumulates_with_time() {
    let (mut net, [a, _, c], _) = star();
    net.start_flow(NetFlow::new(FlowId(0), a, c, DataRate::from_mbps(100.0)))
        .unwrap();
    net.advance_by(crate::sim::SimTime::from_secs(2));
    let kb = net.flow(FlowId(0)).unwrap().transmitted_kb();
    assert!((kb - 200_000.0).abs() < 1e-6);
}

#[test]
fn flow_hash_port_selection_keeps_rates_consistent() {
    let (mut net, h0, h1, _) = diamond();
    net.set_port_selection_policy(Box::new(FlowHashPort::new(42)));
    net.set_forwarding_policy(Box::new(StaticEcmp));
    for i in 0..4 {
        net.start_flow(NetFlow::new(FlowId(i), h0, h1, DataRate::from_mbps(200.0)))
            .unwrap();
    }
    let total: DataRate = net.flows().map(|f| f.granted_rate()).sum();
    assert!(total.approx_eq(DataRate::from_mbps(800.0)));
    assert!(net.check_consistency().is_empty());
}

#[test]
fn connecting_requires_distinct_nodes_and_free_ports() {
    let mut net = Network::new();
    let a = net.add_host("a", gbit());
    let b = net.add_host("b", gbit());
    let c = net.add_host("c", gbit());

    assert!(matches!(net.connect(a, a), Err(NetError::InvalidTopology(_))));
    net.connect(a, b).unwrap();
    assert!(matches!(net.connect(a, c), Err(NetError::NoFreePort(id)) if id == a));
    assert!(matches!(
        net.connect(c, NodeId(42)),
        Err(NetError::NodeNotFound(NodeId(42)))
    ));
    assert_eq!(net.links().len(), 2);
    assert!(matches!(
        net.add_node_with_id(a, crate::net::NodeKind::Host, "dup", gbit(), 1),
        Err(NetError::InvalidTopology(_))
    ));
}
