//! HDR 后装治疗计划独立剂量验证命令行工具

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use hdr_config::{init_logging, ConfigValidator, LoggingConfig, QaConfig};
use hdr_dicom::{PlanValidator, RtPlanParser};
use hdr_dose::{AnisotropyTable, DifferenceBasis, PlanAnalysis, RadialDoseTable, SourceModel, Tg43Engine};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "hdr-check")]
#[command(about = "按 TG-43 独立计算 HDR 计划参考点剂量，并与计划系统剂量比对")]
struct Args {
    /// DICOM RT Plan 文件
    #[arg(short, long, required_unless_present = "print_config")]
    plan: Option<PathBuf>,

    /// 配置文件路径 (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    /// 允许的百分比偏差，覆盖配置文件
    #[arg(short, long)]
    tolerance: Option<f64>,

    /// 百分比偏差的分母，覆盖配置文件
    #[arg(long, value_enum)]
    basis: Option<BasisArg>,

    /// 输出格式
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// 输出指定参考点的逐驻留位置剂量明细
    #[arg(long)]
    breakdown: Option<String>,

    /// 打印生效配置后退出
    #[arg(long)]
    print_config: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BasisArg {
    Reference,
    Computed,
}

impl From<BasisArg> for DifferenceBasis {
    fn from(arg: BasisArg) -> Self {
        match arg {
            BasisArg::Reference => DifferenceBasis::Reference,
            BasisArg::Computed => DifferenceBasis::Computed,
        }
    }
}

fn effective_config(args: &Args) -> Result<QaConfig> {
    let mut config = QaConfig::load(args.config.as_deref()).context("加载配置失败")?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(tolerance) = args.tolerance {
        config.analysis.tolerance_percent = tolerance;
    }
    if let Some(basis) = args.basis {
        config.analysis.difference_basis = basis.into();
    }
    ConfigValidator::new().validate(&config).context("命令行参数无效")?;
    Ok(config)
}

/// 配置加载失败时使用的日志设置
fn fallback_logging(args: &Args) -> LoggingConfig {
    let mut logging = LoggingConfig::default();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    logging
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let config = match effective_config(&args) {
        Ok(config) => config,
        Err(e) => {
            let _ = init_logging(&fallback_logging(&args));
            error!("配置无效: {:#}", e);
            return Err(e);
        }
    };

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    init_logging(&config.logging)?;
    info!("启动HDR剂量验证...");
    match &args.config {
        Some(path) => info!("配置文件: {}", path.display()),
        None => info!("未指定配置文件，使用默认配置与环境变量"),
    }
    debug!("生效配置: {:?}", config);

    let source = &config.source;
    let radial_dose = RadialDoseTable::load(&source.radial_dose_table, source.radial_dose_column.as_deref())
        .with_context(|| format!("加载径向剂量数据表失败: {}", source.radial_dose_table.display()))?;
    let anisotropy = AnisotropyTable::load(&source.anisotropy_table, source.anisotropy_column.as_deref())
        .with_context(|| format!("加载各向异性数据表失败: {}", source.anisotropy_table.display()))?;

    let plan_path = match &args.plan {
        Some(path) => path,
        None => bail!("未指定治疗计划文件"),
    };
    let plan = RtPlanParser::parse_file(plan_path)
        .with_context(|| format!("读取治疗计划失败: {}", plan_path.display()))?;

    let validation = PlanValidator::new().validate_plan(&plan);
    info!("计划验证: {}", validation.get_summary());
    if validation.has_errors() || validation.has_warnings() {
        eprint!("{}", validation.get_detailed_report());
    }
    if validation.has_errors() {
        bail!("治疗计划未通过验证: {}", validation.get_summary());
    }

    let air_kerma_strength = SourceModel::resolve_air_kerma_strength(source.air_kerma_strength, &plan)?;
    let model = SourceModel::new(
        source.name.clone(),
        source.dose_rate_constant,
        air_kerma_strength,
        source.active_length_cm,
        radial_dose,
        anisotropy,
    )?;
    let engine = Arc::new(Tg43Engine::new(model));

    let analysis = PlanAnalysis::new(Arc::clone(&engine), config.analysis_options());
    let report = analysis.run(&plan).await?;

    match args.format {
        OutputFormat::Table => print!("{}", report.render_table()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    if let Some(name) = &args.breakdown {
        let poi = plan
            .points()
            .iter()
            .find(|p| &p.name == name)
            .with_context(|| format!("计划中没有参考点 {}", name))?;
        let trains = analysis.source_trains(&plan)?;
        let contributions = engine.calculate_dose_breakdown(&trains, &poi.position())?;

        eprintln!("参考点 {} 剂量明细:", poi.name);
        eprintln!(
            "{:>4} {:>4} {:>10} {:>9} {:>9} {:>11} {:>9} {:>9} {:>12}",
            "Ch", "#", "Time (s)", "r (cm)", "θ (°)", "G", "g(r)", "F", "Dose (Gy)"
        );
        for c in &contributions {
            eprintln!(
                "{:>4} {:>4} {:>10.4} {:>9.4} {:>9.3} {:>11.6} {:>9.5} {:>9.5} {:>12.6}",
                c.channel, c.dwell_index, c.dwell_time, c.r, c.theta_deg, c.geometry, c.radial_dose, c.anisotropy, c.dose
            );
        }
    }

    if report.all_within_tolerance() {
        info!("所有参考点均在容差范围内");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(
            "存在超出容差或计算失败的参考点 (失败 {} 个)",
            report.failure_count()
        );
        Ok(ExitCode::from(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_overrides() {
        let args = Args::parse_from([
            "hdr-check",
            "--plan",
            "plan.dcm",
            "--tolerance",
            "2.5",
            "--basis",
            "computed",
            "--log-level",
            "debug",
        ]);
        let config = effective_config(&args).unwrap();
        assert_eq!(config.analysis.tolerance_percent, 2.5);
        assert_eq!(config.analysis.difference_basis, DifferenceBasis::Computed);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = Args::parse_from(["hdr-check", "--plan", "plan.dcm", "--tolerance=-1"]);
        assert!(effective_config(&args).is_err());
        assert_eq!(fallback_logging(&args).level, "info");
    }

    #[test]
    fn test_plan_required_unless_printing_config() {
        assert!(Args::try_parse_from(["hdr-check"]).is_err());
        assert!(Args::try_parse_from(["hdr-check", "--print-config"]).is_ok());
    }
}
