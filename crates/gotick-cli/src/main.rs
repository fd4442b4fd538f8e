// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! gotick CLI: small demo programs on the tick scheduler.

mod output;

use std::env;
use std::process;

use gotick_rt::{Chan, Outcome, Scheduler, SchedulerConfig, Step};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const VERSION: &str = env!("CARGO_PKG_VERSION");

type Demo = fn(&Scheduler, u32) -> Chan<Outcome<String>>;

fn main() {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let verbose = take_flag(&mut args, &["-v", "--verbose"]);

    output::init();
    init_logging(verbose);

    let Some(cmd) = args.first() else {
        print_usage();
        return;
    };

    match cmd.as_str() {
        "pingpong" => run_demo("pingpong", count_arg(&args, 5).max(1), pingpong),
        "pipeline" => run_demo("pipeline", count_arg(&args, 10), pipeline),
        "countdown" => run_demo("countdown", count_arg(&args, 3), countdown),
        "help" | "--help" | "-h" => print_usage(),
        "version" | "--version" | "-V" => println!("gotick {}", VERSION),
        other => {
            eprintln!("{}: unknown command `{}`", output::error_label(), other);
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        "{} {} - goroutine-style jobs on a single ticking thread",
        output::title("gotick"),
        output::version(VERSION)
    );
    println!();
    println!(
        "{} gotick [-v] <command> [{}]",
        output::section_header("Usage:"),
        output::arg("n")
    );
    println!();
    println!("{}", output::section_header("Commands:"));
    println!(
        "  {} [{}]   Two jobs bounce a ball n times (default 5)",
        output::command("pingpong"),
        output::arg("n")
    );
    println!(
        "  {} [{}]   Source, square and sum stages over 1..=n (default 10)",
        output::command("pipeline"),
        output::arg("n")
    );
    println!(
        "  {} [{}]  Loop from n down to liftoff (default 3)",
        output::command("countdown"),
        output::arg("n")
    );
    println!("  {}           Show this help", output::command("help"));
    println!("  {}        Show version", output::command("version"));
    println!();
    println!("{}", output::section_header("Environment:"));
    println!("  GOTICK_TICK_INTERVAL_MS   Pause between ticks (default 1)");
    println!("  GOTICK_STOP_WHEN_IDLE     Return once no job is runnable");
}

fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    let before = args.len();
    args.retain(|a| !names.contains(&a.as_str()));
    args.len() != before
}

fn count_arg(args: &[String], default: u32) -> u32 {
    match args.get(1) {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(n) => n,
            Err(_) => {
                eprintln!(
                    "{}: expected a count, got `{}`",
                    output::error_label(),
                    raw
                );
                process::exit(1);
            }
        },
    }
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("{}: could not install logger: {}", output::error_label(), e);
    }
}

/// Build the demo, then drive it on the paced tick loop until its result
/// channel fills.
fn run_demo(name: &str, n: u32, build: Demo) {
    let config = match SchedulerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", output::error_label(), e);
            process::exit(1);
        }
    };
    println!("{}", output::banner_start(name, config.tick_interval));

    let sched = Scheduler::with_config(config);
    let result = build(&sched, n);
    let stopper = sched.stop_token();
    let watched = sched.go(async move {
        let outcome = result.take().await;
        stopper.stop();
        outcome
    });

    let ticks = sched.run();
    let stats = sched.stats();
    let parked = sched.parked_jobs();
    sched.shutdown();

    match watched.poll() {
        Some(Ok(Ok(summary))) => {
            println!("{}", output::banner_ok(name));
            println!("  {}", summary);
            println!("  {}", output::stats_line(ticks, &stats));
        }
        Some(Ok(Err(fault))) | Some(Err(fault)) => {
            eprintln!("{}: {}", output::error_label(), fault);
            process::exit(1);
        }
        None => {
            eprintln!(
                "{}: {} stopped before finishing ({} jobs still parked)",
                output::error_label(),
                name,
                parked
            );
            process::exit(1);
        }
    }
}

/// Pinger loop serves numbered balls; the ponger consumes and returns them.
fn pingpong(sched: &Scheduler, rounds: u32) -> Chan<Outcome<String>> {
    let ping = sched.chan::<u32>(1);
    let pong = sched.chan::<u32>(1);

    let back = pong.clone();
    sched.goconsume(
        &ping,
        move |ball, recur, ()| {
            let back = back.clone();
            async move {
                println!("  {} {}", output::actor("pong"), ball);
                back.put(ball).await;
                if ball >= rounds {
                    Step::Done(())
                } else {
                    recur.call(())
                }
            }
        },
        (),
    );

    sched.goloop(
        move |recur, ball: u32| {
            let serve = ping.clone();
            let back = pong.clone();
            async move {
                println!("  {} {}", output::actor("ping"), ball);
                serve.put(ball).await;
                let returned = back.take().await;
                if returned >= rounds {
                    Step::Done(format!("{} rounds played", returned))
                } else {
                    recur.call(returned + 1)
                }
            }
        },
        1,
    )
}

/// numbers -> square -> sum, ended by a zero sentinel.
fn pipeline(sched: &Scheduler, n: u32) -> Chan<Outcome<String>> {
    let numbers = sched.chan::<u64>(2);
    let squares = sched.chan::<u64>(2);

    let source = numbers.clone();
    sched.go(async move {
        for v in 1..=u64::from(n) {
            source.put(v).await;
        }
        source.put(0).await;
    });

    let out = squares.clone();
    sched.goconsume(
        &numbers,
        move |v, recur, ()| {
            let out = out.clone();
            async move {
                out.put(v * v).await;
                if v == 0 {
                    Step::Done(())
                } else {
                    println!("  {} {} -> {}", output::actor("square"), v, v * v);
                    recur.call(())
                }
            }
        },
        (),
    );

    sched.goconsume(
        &squares,
        move |sq, recur, sum: u64| async move {
            if sq == 0 {
                Step::Done(format!("sum of squares 1..={} = {}", n, sum))
            } else {
                println!("  {} {} (+{})", output::actor("sum"), sum + sq, sq);
                recur.call(sum + sq)
            }
        },
        0,
    )
}

fn countdown(sched: &Scheduler, from: u32) -> Chan<Outcome<String>> {
    sched.goloop(
        |recur, n: u32| async move {
            println!("  {} {}", output::actor("countdown"), n);
            if n == 0 {
                Step::Done("liftoff".to_string())
            } else {
                recur.call(n - 1)
            }
        },
        from,
    )
}
