use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use helm_bms::exchange::{exchange, open_serial};
use helm_bms::frame::{self, BasicInfo};
use helm_bms::{BatteryMonitor, BmsConfig};
use helm_node::controller::{run_controller, ControllerNode};
use helm_node::doctor;
use helm_node::hal::inbound_channel;
use helm_node::link::UdpLink;
use helm_node::sim::{lossy_link, spawn_lossy_receiver, spawn_sim_bms, ScriptedOperator, SimGpio, SimStepper};
use helm_node::thruster::{run_thruster, ThrusterNode};
use helm_node::{ControllerConfig, LinkConfig, SimConfig, ThrusterConfig};
use helm_proto::{CommandMessage, StatusMessage};

#[derive(Debug, Parser)]
#[command(name = "helm", version, about = "helm - thruster control link (controller and thruster units)")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    /// Run the controller unit over UDP.
    Controller,
    /// Run the thruster unit over UDP.
    Thruster,
    /// Run both units in-process over a lossy in-memory link.
    Sim {
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    Bms { #[command(subcommand)] cmd: BmsCmd },
}

#[derive(Debug, Subcommand)]
enum BmsCmd {
    /// One basic info exchange on the configured serial device.
    Query,
}

#[derive(Debug, Default, serde::Deserialize)]
struct Config {
    #[serde(default)]
    link: LinkConfig,
    controller: Option<ControllerConfig>,
    thruster: Option<ThrusterConfig>,
    bms: Option<BmsConfig>,
    sim: Option<SimConfig>,
}

impl Config {
    fn controller(&self) -> ControllerConfig {
        self.controller.clone().unwrap_or_default()
    }

    fn thruster(&self) -> ThrusterConfig {
        self.thruster.clone().unwrap_or_default()
    }

    fn bms(&self) -> BmsConfig {
        self.bms.clone().unwrap_or_default()
    }

    fn sim(&self) -> SimConfig {
        self.sim.clone().unwrap_or_default()
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor_cmd(&cfg)?,
        Command::Controller => controller_cmd(&cfg).await?,
        Command::Thruster => thruster_cmd(&cfg).await?,
        Command::Sim { seconds } => sim_cmd(&cfg, Duration::from_secs(seconds)).await?,
        Command::Bms { cmd } => bms_cmd(&cfg, cmd).await?,
    }
    Ok(())
}

fn doctor_cmd(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    doctor::check_link(&cfg.link)?;
    if cfg.link.bind.is_none() || cfg.link.peer.is_none() {
        warn!("doctor: link.bind/link.peer not set; only `helm sim` will run");
    }
    doctor::check_controller(&cfg.controller())?;
    doctor::check_thruster(&cfg.thruster())?;
    doctor::check_bms(&cfg.bms())?;
    doctor::check_sim(&cfg.sim())?;
    info!("doctor: OK");
    Ok(())
}

fn endpoints(link: &LinkConfig) -> Result<(SocketAddr, SocketAddr)> {
    doctor::check_udp_endpoints(link)?;
    let bind = link.bind.context("link.bind missing")?;
    let peer = link.peer.context("link.peer missing")?;
    Ok((bind, peer))
}

/// Resolves once Ctrl-C arrives or `stop` flips to true.
async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|s| *s).await;
}

fn spawn_ctrl_c(stop: watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        let _ = stop.send(true);
    });
}

async fn controller_cmd(cfg: &Config) -> Result<()> {
    let (bind, peer) = endpoints(&cfg.link)?;
    let ccfg = cfg.controller();
    let sim = cfg.sim();
    doctor::check_controller(&ccfg)?;
    doctor::check_sim(&sim)?;

    let link = UdpLink::open(bind, peer).await.context("controller link")?;
    let (tx, rx) = inbound_channel::<StatusMessage>();
    let recv = link.spawn_receiver(tx);

    warn!("controller: no panel hardware on this host, using scripted operator inputs");
    let panel = SimGpio::new("panel");
    let operator = ScriptedOperator::new(&sim, ccfg.enable_pin(), ccfg.dial_counts_per_rev(), panel.clone());
    let node = ControllerNode::new(&ccfg, &cfg.link, panel, operator, link, rx);

    let (stop_tx, stop_rx) = watch::channel(false);
    spawn_ctrl_c(stop_tx);
    run_controller(node, ccfg.loop_period(), stopped(stop_rx)).await?;
    recv.abort();
    Ok(())
}

async fn thruster_cmd(cfg: &Config) -> Result<()> {
    let (bind, peer) = endpoints(&cfg.link)?;
    let tcfg = cfg.thruster();
    let bcfg = cfg.bms();
    let sim = cfg.sim();
    doctor::check_thruster(&tcfg)?;
    doctor::check_bms(&bcfg)?;
    doctor::check_sim(&sim)?;

    let link = UdpLink::open(bind, peer).await.context("thruster link")?;
    let (tx, rx) = inbound_channel::<CommandMessage>();
    let recv = link.spawn_receiver(tx);

    warn!("thruster: no stepper driver on this host, using simulated azimuth drive");
    let motor = SimStepper::new(tcfg.steps_per_rev(), tcfg.encoder_counts_per_rev(), sim.slew_deg_per_s());
    let node = ThrusterNode::new(&tcfg, &cfg.link, SimGpio::new("relay"), motor.clone(), motor, link, rx);
    let monitor = BatteryMonitor::new(&bcfg);

    let (stop_tx, stop_rx) = watch::channel(false);
    spawn_ctrl_c(stop_tx);

    match &bcfg.serial_dev {
        Some(dev) => {
            let port = open_serial(dev, bcfg.baud())?;
            info!("thruster: bms on {} @ {}", dev, bcfg.baud());
            run_thruster(node, monitor, port, tcfg.loop_period(), stopped(stop_rx)).await?;
        }
        None => {
            warn!("thruster: bms.serial_dev not set, using simulated pack");
            let (port, pack) = spawn_sim_bms(&sim);
            run_thruster(node, monitor, port, tcfg.loop_period(), stopped(stop_rx)).await?;
            pack.abort();
        }
    }
    recv.abort();
    Ok(())
}

async fn sim_cmd(cfg: &Config, duration: Duration) -> Result<()> {
    let ccfg = cfg.controller();
    let tcfg = cfg.thruster();
    let bcfg = cfg.bms();
    let sim = cfg.sim();
    doctor::check_link(&cfg.link)?;
    doctor::check_sim(&sim)?;

    info!("sim: {:?}, drop probability {:.2}", duration, sim.drop_probability());

    let (to_thruster, to_thruster_rx) = lossy_link(sim.drop_probability());
    let (to_controller, to_controller_rx) = lossy_link(sim.drop_probability());
    let (cmd_tx, cmd_rx) = inbound_channel::<CommandMessage>();
    let (st_tx, st_rx) = inbound_channel::<StatusMessage>();
    let recv_cmd = spawn_lossy_receiver(to_thruster_rx, cmd_tx);
    let recv_st = spawn_lossy_receiver(to_controller_rx, st_tx);

    let panel = SimGpio::new("panel");
    let operator = ScriptedOperator::new(&sim, ccfg.enable_pin(), ccfg.dial_counts_per_rev(), panel.clone());
    let controller = ControllerNode::new(&ccfg, &cfg.link, panel, operator, to_thruster, st_rx);

    let motor = SimStepper::new(tcfg.steps_per_rev(), tcfg.encoder_counts_per_rev(), sim.slew_deg_per_s());
    let thruster = ThrusterNode::new(&tcfg, &cfg.link, SimGpio::new("relay"), motor.clone(), motor, to_controller, cmd_rx);
    let (bms_port, pack) = spawn_sim_bms(&sim);

    let (stop_tx, stop_rx) = watch::channel(false);
    let deadline_stop = stop_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        let _ = deadline_stop.send(true);
    });
    spawn_ctrl_c(stop_tx);

    let (c, t) = tokio::join!(
        run_controller(controller, ccfg.loop_period(), stopped(stop_rx.clone())),
        run_thruster(thruster, BatteryMonitor::new(&bcfg), bms_port, tcfg.loop_period(), stopped(stop_rx)),
    );
    c?;
    t?;

    recv_cmd.abort();
    recv_st.abort();
    pack.abort();
    info!("sim: done");
    Ok(())
}

async fn bms_cmd(cfg: &Config, cmd: BmsCmd) -> Result<()> {
    match cmd {
        BmsCmd::Query => {
            let bcfg = cfg.bms();
            let dev = bcfg.serial_dev.clone().context("bms.serial_dev missing")?;
            let mut port = open_serial(&dev, bcfg.baud())?;

            let raw = exchange(&mut port, frame::CMD_BASIC_INFO, bcfg.response_timeout())
                .await
                .with_context(|| format!("bms exchange on {}", dev))?;
            println!("rx={}", hex::encode(&raw));

            let payload = frame::parse_response(frame::CMD_BASIC_INFO, &raw).context("bms response")?;
            let info = BasicInfo::from_payload(payload).context("bms basic info")?;
            println!("voltage={:.2}V current={:.2}A rsoc={}%", info.total_voltage_v, info.current_a, info.rsoc);
            println!("low={} (threshold {}%)", info.rsoc < bcfg.low_battery_pct(), bcfg.low_battery_pct());
            Ok(())
        }
    }
}
