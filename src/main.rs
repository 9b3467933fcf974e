use std::{fs, path::PathBuf, process::ExitCode, time::Instant};

use icache_rs::{
    config::Config, cpu::Cpu, driver::Driver, error::Error, stats::SimStats, trace::Trace,
};

struct Args {
    max_insts: u64,
    n_warm: u64,
    heartbeat_int: u64,
    config: Config,
    stats_path: Option<PathBuf>,
    trace_path: PathBuf,
    inst_per_block: usize,
    blocks_per_queue: usize,
}

fn parse_args() -> Result<Args, Error> {
    let mut args = pico_args::Arguments::from_env();
    let max_insts = args.opt_value_from_str("-i")?.unwrap_or(0);
    let n_warm = args.opt_value_from_str("-w")?.unwrap_or(0);
    let heartbeat_int = args.opt_value_from_str("-h")?.unwrap_or(0);

    let config = if let Some(json) = args.opt_value_from_str::<_, String>("--config")? {
        Config::from_json(&json)?
    } else if let Some(path) = args.opt_value_from_str::<_, PathBuf>("-p")? {
        Config::from_path(&path)?
    } else {
        Config::default()
    };

    let stats_path = args.opt_value_from_str("--json")?;
    let trace_path = args
        .opt_value_from_str("-t")?
        .ok_or(Error::Usage("must provide a trace with -t <path>"))?;
    let inst_per_block = args.opt_value_from_str("--buffer-size")?.unwrap_or(1024 * 16);
    let blocks_per_queue = args.opt_value_from_str("--queue-size")?.unwrap_or(32);

    let rest = args.finish();
    if !rest.is_empty() {
        log::warn!("ignoring unexpected arguments: {:?}", rest);
    }

    Ok(Args {
        max_insts,
        n_warm,
        heartbeat_int,
        config,
        stats_path,
        trace_path,
        inst_per_block,
        blocks_per_queue,
    })
}

fn simulate(args: Args) -> Result<SimStats, Error> {
    let caches = args.config.to_caches()?;
    log::info!(
        "{} cache(s), writeback on {:?}, flags from {:?} instruction",
        caches.len(),
        args.config.writeback,
        args.config.flag_timing
    );
    for c in &caches {
        log::info!("  {}: {} sets x {} ways", c.name(), c.num_sets(), c.ways());
    }
    let mut driver = Driver::new(caches, args.config.flag_timing);
    let mut cpu = Cpu::new();

    let trace = Trace::read(&args.trace_path, args.inst_per_block, args.blocks_per_queue)?;
    log::info!("** starting cache simulation on {} **", args.trace_path.display());

    let mut warmup = args.n_warm > 0;
    let limit = |from: u64| (args.max_insts > 0).then_some(from + args.max_insts);
    let mut goal = if warmup { Some(args.n_warm) } else { limit(0) };
    let mut next_heartbeat = args.heartbeat_int;
    let mut start = Instant::now();

    'run: for instr_block in trace {
        let instr_block = instr_block?;
        let mut pending = &instr_block[..];
        while !pending.is_empty() {
            let done = driver.run(&mut cpu, pending, goal);
            pending = &pending[done..];

            if args.heartbeat_int != 0 && cpu.instr_idx >= next_heartbeat {
                log::info!("Instr: {}", cpu.instr_idx);
                while next_heartbeat <= cpu.instr_idx {
                    next_heartbeat += args.heartbeat_int;
                }
            }

            if goal.is_some_and(|g| cpu.instr_idx >= g) {
                if warmup {
                    driver.clear_stats();
                    goal = limit(cpu.instr_idx);
                    warmup = false;
                    start = Instant::now();
                    log::info!("Finished warmup after {} instructions", cpu.instr_idx);
                } else {
                    break 'run;
                }
            }
        }
    }
    if warmup {
        log::warn!("trace ended during warmup; statistics cover the warmup only");
    }
    log::info!("Ran {} instructions", cpu.instr_idx);

    Ok(SimStats::collect(&driver, start.elapsed()))
}

fn report(stats: &SimStats, stats_path: Option<PathBuf>) -> Result<(), Error> {
    println!("{stats}");
    if let Some(path) = stats_path {
        let stats_file = fs::File::create(&path).map_err(Error::Output)?;
        serde_json::to_writer_pretty(stats_file, stats).map_err(Error::Encode)?;
        log::info!("wrote stats to {}", path.display());
    }
    Ok(())
}

fn run() -> Result<(), Error> {
    let args = parse_args()?;
    let stats_path = args.stats_path.clone();
    let stats = simulate(args)?;
    report(&stats, stats_path)
}

fn main() -> ExitCode {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
