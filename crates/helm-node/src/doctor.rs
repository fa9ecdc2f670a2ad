use anyhow::Result;
use helm_bms::BmsConfig;

use crate::{ControllerConfig, LinkConfig, SimConfig, ThrusterConfig};

pub fn check_link(link: &LinkConfig) -> Result<()> {
    let hb = link.heartbeat();
    let timeout = link.timeout();
    anyhow::ensure!(hb.as_millis() >= 10, "link.heartbeat_ms too small");
    anyhow::ensure!(timeout > hb * 2, "link.timeout_ms should exceed two heartbeats ({:?})", hb * 2);
    if let (Some(bind), Some(peer)) = (link.bind, link.peer) {
        anyhow::ensure!(bind != peer, "link.bind and link.peer are the same address");
    }
    Ok(())
}

pub fn check_udp_endpoints(link: &LinkConfig) -> Result<()> {
    anyhow::ensure!(link.bind.is_some(), "link.bind missing");
    anyhow::ensure!(link.peer.is_some(), "link.peer missing");
    Ok(())
}

pub fn check_controller(c: &ControllerConfig) -> Result<()> {
    let pins = [c.enable_pin(), c.led_red_pin(), c.led_green_pin()];
    anyhow::ensure!(pins[0] != pins[1] && pins[0] != pins[2] && pins[1] != pins[2], "controller pins must be distinct");
    anyhow::ensure!(c.dial_counts_per_rev() >= 4, "controller.dial_counts_per_rev too low");
    anyhow::ensure!(c.blink().as_millis() >= 50, "controller.blink_ms too small");
    anyhow::ensure!(c.loop_period() < c.blink(), "controller.loop_ms must be shorter than blink_ms");
    Ok(())
}

pub fn check_thruster(t: &ThrusterConfig) -> Result<()> {
    let tol = t.tolerance_deg();
    anyhow::ensure!(tol > 0.0 && tol < 180.0, "thruster.tolerance_deg should be in (0, 180)");
    anyhow::ensure!(t.encoder_counts_per_rev() >= 64, "thruster.encoder_counts_per_rev too low");
    anyhow::ensure!(t.steps_per_rev() >= 48, "thruster.steps_per_rev too low");
    anyhow::ensure!(
        (1..=100).contains(&t.loop_period().as_millis()),
        "thruster.loop_ms should be 1..100"
    );
    Ok(())
}

pub fn check_bms(b: &BmsConfig) -> Result<()> {
    anyhow::ensure!(b.low_battery_pct() <= 100, "bms.low_battery_pct above 100");
    anyhow::ensure!(b.response_timeout().as_millis() >= 20, "bms.response_timeout_ms too small");
    anyhow::ensure!(b.poll_interval() > b.response_timeout(), "bms.poll_interval_ms must exceed the response timeout");
    if let Some(dev) = &b.serial_dev {
        anyhow::ensure!(!dev.is_empty(), "bms.serial_dev is empty");
        anyhow::ensure!(b.baud() > 0, "bms.baud invalid");
    }
    Ok(())
}

pub fn check_sim(s: &SimConfig) -> Result<()> {
    anyhow::ensure!((0.0..=1.0).contains(&s.drop_probability()), "sim.drop_probability should be 0..1");
    anyhow::ensure!((0.0..=1.0).contains(&s.bms_fault_probability()), "sim.bms_fault_probability should be 0..1");
    anyhow::ensure!((0.0..=100.0).contains(&s.battery_start_pct()), "sim.battery_start_pct should be 0..100");
    anyhow::ensure!(s.slew_deg_per_s() > 0.0, "sim.slew_deg_per_s must be positive");
    Ok(())
}
