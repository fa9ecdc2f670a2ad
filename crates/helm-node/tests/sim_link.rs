use std::time::{Duration, Instant};

use helm_bms::{BatteryMonitor, BmsConfig};
use helm_node::controller::ControllerNode;
use helm_node::hal::{inbound_channel, Actuator};
use helm_node::led::LedState;
use helm_node::sim::{lossy_link, spawn_lossy_receiver, spawn_sim_bms, SimGpio, SimStepper};
use helm_node::thruster::ThrusterNode;
use helm_node::{ControllerConfig, LinkConfig, SimConfig, ThrusterConfig};
use helm_proto::{CommandMessage, StatusMessage};

#[tokio::test]
async fn nodes_converge_over_lossless_link() {
    let link = LinkConfig { heartbeat_ms: Some(50), timeout_ms: Some(300), ..Default::default() };
    let ccfg = ControllerConfig { dial_counts_per_rev: Some(360), ..Default::default() };
    let tcfg = ThrusterConfig::default();
    let sim = SimConfig { battery_start_pct: Some(80.0), drain_pct_per_min: Some(0.0), ..Default::default() };

    let (to_thruster, to_thruster_rx) = lossy_link(0.0);
    let (to_controller, to_controller_rx) = lossy_link(0.0);
    let (cmd_tx, cmd_rx) = inbound_channel::<CommandMessage>();
    let (st_tx, st_rx) = inbound_channel::<StatusMessage>();
    let _a = spawn_lossy_receiver(to_thruster_rx, cmd_tx);
    let _b = spawn_lossy_receiver(to_controller_rx, st_tx);

    // dial parked at 90 degrees, switch on
    let panel = SimGpio::new("panel");
    panel.force_input(ccfg.enable_pin(), true);
    let mut dial = SimStepper::new(360, 360, 1_000_000.0);
    dial.move_actuator_to(90);
    let mut ctrl = ControllerNode::new(&ccfg, &link, panel.clone(), dial, to_thruster, st_rx);

    let motor = SimStepper::new(tcfg.steps_per_rev(), tcfg.encoder_counts_per_rev(), 20_000.0);
    let relay = SimGpio::new("relay");
    let mut thr = ThrusterNode::new(&tcfg, &link, relay.clone(), motor.clone(), motor.clone(), to_controller, cmd_rx);

    let (mut bms_port, _bms) = spawn_sim_bms(&sim);
    let mut monitor = BatteryMonitor::new(&BmsConfig::default());
    let battery = monitor.poll(&mut bms_port, Instant::now()).await;
    assert_eq!(battery.percent, Some(80));
    assert!(!battery.low);
    thr.on_battery(battery);

    let mut led = LedState::FlashingRed;
    for _ in 0..60 {
        led = ctrl.step(Instant::now()).led;
        let snap = thr.step(Instant::now());
        if led == LedState::Green && snap.relay_enabled {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(led, LedState::Green);
    assert!(relay.level(tcfg.relay_pin()));
    assert!(panel.level(ccfg.led_green_pin()));

    // controller goes quiet: thruster must drop the relay on its own
    drop(ctrl);
    tokio::time::sleep(Duration::from_millis(350)).await;
    let snap = thr.step(Instant::now());
    assert!(!snap.connected);
    assert!(!snap.relay_enabled);
    assert!(!relay.level(tcfg.relay_pin()));
}
