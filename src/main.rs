use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crystal_nodes::app::{print_final_state, RunOptions, Simulation};
use crystal_nodes::fail;
use crystal_nodes::{LevelDesc, WorldConfig};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        fail::fatal(err);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let level = LevelDesc::load(&options.path)?;

    println!(
        "Loaded level with {} groups ({} models, {} clips)",
        level.groups.len(),
        level.models.len(),
        level.clips.len()
    );

    let mut simulation = Simulation::load(level, WorldConfig::default())?;
    println!(
        "Spawned {} groups ({} nodes)",
        simulation.spawned.len(),
        simulation.world.live_nodes()
    );

    let summary = simulation.run(&options.run)?;
    if let Some(frame) = options.run.reload_at.filter(|&frame| frame <= summary.frames) {
        println!("Reloaded after frame {frame}");
    }
    println!(
        "Ran {} frames (t={:.2}): {} nodes in {} groups, {} draw commands",
        summary.frames, summary.time, summary.live_nodes, summary.groups, summary.draw_commands
    );
    print_final_state(&simulation.world);
    Ok(())
}

const USAGE: &str =
    "Usage: crystal-nodes <level.xml> [--frames N] [--dt SECONDS] [--hold KEY]... [--reload-at N]";

#[derive(Debug)]
struct CliOptions {
    path: PathBuf,
    run: RunOptions,
}

impl CliOptions {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let Some(path) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        let mut run = RunOptions::default();
        while let Some(arg) = args.next() {
            let mut value = || {
                args.next()
                    .ok_or_else(|| anyhow!("{arg} expects a value\n{USAGE}"))
            };
            match arg.as_str() {
                "--frames" => {
                    run.frames = value()?.parse().context("--frames")?;
                }
                "--dt" => {
                    run.dt = value()?.parse().context("--dt")?;
                }
                "--hold" => run.hold.push(value()?),
                "--reload-at" => {
                    run.reload_at = Some(value()?.parse().context("--reload-at")?);
                }
                other => {
                    return Err(anyhow!("Unknown argument: {other}\n{USAGE}"));
                }
            }
        }
        Ok(Self {
            path: PathBuf::from(path),
            run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        CliOptions::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn parses_every_flag() {
        let options = parse(&[
            "level.xml",
            "--frames",
            "3",
            "--dt",
            "0.5",
            "--hold",
            "Right",
            "--hold",
            "W",
            "--reload-at",
            "2",
        ])
        .unwrap();
        assert_eq!(options.path, PathBuf::from("level.xml"));
        assert_eq!(options.run.frames, 3);
        assert_eq!(options.run.dt, 0.5);
        assert_eq!(options.run.hold, vec!["Right", "W"]);
        assert_eq!(options.run.reload_at, Some(2));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["level.xml", "--frames"]).is_err());
        assert!(parse(&["level.xml", "--frames", "x"]).is_err());
        assert!(parse(&["level.xml", "--bogus"]).is_err());
    }
}
