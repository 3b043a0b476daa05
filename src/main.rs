use std::{env, fs, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use solana_client::nonblocking::rpc_client::RpcClient;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod api;
mod config;
mod engine;
mod instructions;
mod lander;
mod monitoring;
mod protocols;

use config::{ExitConfig, GlobalConfig, load_config};
use engine::{
    ExitOptions, ExitOrchestrator, FeeEscalation, KeypairSigner, OrchestratorSettings,
    OrchestratorState, Planner, RunPhase,
};
use lander::{LedgerClient, RpcLander};
use protocols::ProtocolKind;

const RPC_URL_ENV: &str = "LP_EXIT_RPC_URL";
const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

#[derive(Parser, Debug)]
#[command(name = "lp-exit", version, about = "流动性仓位一键退出")]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径（默认查找 lp-exit.yaml 或 config/lp-exit.yaml）"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 发现仓位、签名并逐个提交退出交易
    Run(ExitCmd),
    /// 只做发现与规划，输出 JSON，不签名
    Plan(ExitCmd),
    /// 打印某个基础费率对应的优先费档位
    Fees(FeesCmd),
    /// 初始化配置模版文件
    Init(InitCmd),
}

#[derive(Args, Debug)]
struct ExitCmd {
    #[arg(long, help = "第一档优先费（微 lamports / CU）")]
    fee_level_base: Option<u64>,
    #[arg(long, help = "单笔交易的 compute unit 上限")]
    compute_unit_ceiling: Option<u32>,
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = parse_protocol,
        help = "启用的协议，逗号分隔（fee_vault,clmm）"
    )]
    protocols: Vec<ProtocolKind>,
    #[arg(long, help = "滑点（bps）")]
    slippage_bps: Option<u16>,
    #[arg(long, help = "只签名并模拟，不发送")]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct FeesCmd {
    #[arg(help = "基础费率，缺省取配置 exit.fee_level_base")]
    base: Option<u64>,
}

#[derive(Args, Debug)]
struct InitCmd {
    #[arg(long, value_name = "DIR", help = "可选输出目录（默认当前目录）")]
    output: Option<PathBuf>,
    #[arg(long, help = "若文件存在则覆盖")]
    force: bool,
}

fn parse_protocol(raw: &str) -> std::result::Result<ProtocolKind, String> {
    ProtocolKind::parse(raw).ok_or_else(|| format!("未知协议: {raw}"))
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.clone())?;
    init_tracing(&config.global.logging)?;

    if config.bot.prometheus.enable {
        monitoring::try_init_prometheus(&config.bot.prometheus.listen)
            .map_err(|err| anyhow!(err))?;
    }

    match cli.command {
        Command::Run(args) => {
            let options = exit_options(&config, &args);
            let ledger = build_ledger(&config);
            let orchestrator = build_orchestrator(&config, &options, ledger.clone())?;
            let owner = orchestrator.owner();

            match ledger.balance(&owner).await {
                Ok(lamports) => info!(target: "orchestrator", %owner, lamports, "钱包余额"),
                Err(err) => warn!(target: "orchestrator", %owner, error = %err, "查询余额失败"),
            }

            let run = orchestrator.run(options);
            tokio::pin!(run);
            let state = tokio::select! {
                res = &mut run => res,
                _ = tokio::signal::ctrl_c() => {
                    info!(target: "orchestrator", "收到终止信号，等待在途交易结束");
                    orchestrator.abort();
                    run.await
                }
            }?;

            print_summary(&state);
        }
        Command::Plan(args) => {
            let options = exit_options(&config, &args);
            let ledger = build_ledger(&config);
            let orchestrator = build_orchestrator(&config, &options, ledger)?;
            let outcome = orchestrator.plan(&options).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Fees(args) => {
            let base = args.base.unwrap_or(config.exit.fee_level_base);
            let levels = FeeEscalation::from_settings(&config.exit).levels(base);
            for (index, level) in levels.iter().enumerate() {
                println!("{index}\t{level}");
            }
        }
        Command::Init(args) => {
            init_configs(args)?;
        }
    }

    Ok(())
}

fn exit_options(config: &ExitConfig, args: &ExitCmd) -> ExitOptions {
    let protocols = if args.protocols.is_empty() {
        config.protocols.enabled_kinds()
    } else {
        args.protocols.clone()
    };
    let mut options = ExitOptions::from_settings(&config.exit, protocols);
    if let Some(base) = args.fee_level_base {
        options.fee_level_base = base;
    }
    if let Some(ceiling) = args.compute_unit_ceiling {
        options.compute_unit_ceiling = ceiling;
    }
    if let Some(slippage) = args.slippage_bps {
        options.slippage_bps = slippage;
    }
    options.dry_run |= args.dry_run;
    options
}

fn build_ledger(config: &ExitConfig) -> Arc<RpcLander> {
    let client = resolve_rpc_client(&config.global);
    let lander = RpcLander::new(client, config.global.commitment.config()).with_confirmation(
        Duration::from_millis(config.exit.confirm_poll_interval_ms.max(1)),
        Duration::from_millis(config.exit.confirm_timeout_ms),
    );
    info!(target: "lander::rpc", endpoint = %lander.endpoint(), "RPC 已就绪");
    Arc::new(lander)
}

fn build_orchestrator(
    config: &ExitConfig,
    options: &ExitOptions,
    ledger: Arc<RpcLander>,
) -> Result<ExitOrchestrator> {
    let keypair = config::wallet::load_keypair(&config.global.wallet)?;
    let signer = Arc::new(KeypairSigner::new(Arc::new(keypair)));

    let http = reqwest::Client::builder().build()?;
    let adapters = protocols::build_adapters(&config.protocols, http, &options.protocols_enabled);
    if adapters.is_empty() {
        warn!(target: "planner", "没有启用任何协议");
    }

    Ok(ExitOrchestrator::new(
        Planner::new(adapters),
        signer,
        ledger,
        OrchestratorSettings::from_settings(&config.exit),
    ))
}

fn resolve_rpc_client(global: &GlobalConfig) -> Arc<RpcClient> {
    let url = env::var(RPC_URL_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| global.primary_rpc_url().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());

    Arc::new(RpcClient::new_with_commitment(
        url,
        global.commitment.config(),
    ))
}

fn print_summary(state: &OrchestratorState) {
    println!(
        "{:<4} {:<10} {:<9} {:<45} {:<10} {:>10} {:<90} error",
        "#", "protocol", "kind", "pool", "status", "fee", "signature"
    );
    for (index, item) in state.items.iter().enumerate() {
        println!(
            "{:<4} {:<10} {:<9} {:<45} {:<10} {:>10} {:<90} {}",
            index,
            item.task.protocol.as_str(),
            item.task.kind.as_str(),
            item.task.pool.to_string(),
            item.status.as_str(),
            item.fee_level.map(|fee| fee.to_string()).unwrap_or_default(),
            item.submission_id.as_deref().unwrap_or("-"),
            item.error.as_deref().unwrap_or(""),
        );
    }

    let summary = state.summary();
    let status = match state.phase() {
        RunPhase::Error => "异常结束",
        RunPhase::Planning | RunPhase::Running => "仍在运行",
        RunPhase::Idle if state.cancelled => "已中止",
        RunPhase::Idle => "已完成",
    };
    println!(
        "{status}，共 {} 笔：确认 {}，失败 {}，跳过 {}，未完成 {}",
        summary.total, summary.confirmed, summary.failed, summary.skipped, summary.in_flight,
    );
    if let Some(err) = &state.error {
        println!("运行中止: {err}");
    }
}

fn init_tracing(config: &config::LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .init();
    } else {
        fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn init_configs(args: InitCmd) -> Result<()> {
    let output_dir = match args.output {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    fs::create_dir_all(&output_dir)?;

    let target_path = output_dir.join("lp-exit.yaml");
    if target_path.exists() && !args.force {
        println!(
            "跳过 {}（文件已存在，如需覆盖请加 --force）",
            target_path.display()
        );
        return Ok(());
    }

    fs::write(
        &target_path,
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/lp-exit.yaml")),
    )?;
    println!("已写入 {}", target_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}
