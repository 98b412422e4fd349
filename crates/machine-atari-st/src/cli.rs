//! `--flag=value` argument parsing, left-to-right with last-one-wins,
//! matching the binary's own flag syntax (distinct from the
//! space-separated `--flag value` style of this workspace's other
//! `emu-*` binaries).

use std::path::PathBuf;
use std::process;

#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub tos_path: Option<PathBuf>,
    pub altconfig_path: Option<PathBuf>,
    pub debug: bool,
    pub max_speed: Option<bool>,
    pub floppy_path: Option<PathBuf>,
    pub mouse_sensitivity: Option<(i32, i32)>,
}

const USAGE: &str = "\
Usage: machine-atari-st [OPTIONS]

Options:
  --tos=<path>                 Path to TOS ROM (192KiB or 256KiB)
  --altconfig=<path>            Load an alternate JSON config
  --debug                       Enable debug tracing
  --maxspeed=[true|false]       Disable 50Hz pacing
  --floppy=<path>               Insert disk image at startup
  --mouse-sensitivity=X,Y       Integer divisors X,Y (default 2,2)
  --help, -h                    Print this message and exit";

fn parse_bool(value: &str, flag: &str) -> bool {
    match value {
        "true" => true,
        "false" => false,
        other => {
            eprintln!("invalid value for {flag}: {other} (expected true or false)");
            process::exit(1);
        }
    }
}

fn parse_sensitivity(value: &str) -> (i32, i32) {
    let Some((x, y)) = value.split_once(',') else {
        eprintln!("invalid --mouse-sensitivity: {value} (expected X,Y)");
        process::exit(1);
    };
    let (Ok(x), Ok(y)) = (x.trim().parse(), y.trim().parse()) else {
        eprintln!("invalid --mouse-sensitivity: {value} (expected integers)");
        process::exit(1);
    };
    (x, y)
}

#[must_use]
pub fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs::default();

    for arg in &args[1..] {
        if arg == "--help" || arg == "-h" {
            println!("{USAGE}");
            process::exit(0);
        }
        let Some((flag, value)) = arg.split_once('=') else {
            if arg == "--debug" {
                cli.debug = true;
                continue;
            }
            eprintln!("unrecognized argument: {arg}");
            eprintln!("{USAGE}");
            process::exit(1);
        };
        match flag {
            "--tos" => cli.tos_path = Some(PathBuf::from(value)),
            "--altconfig" => cli.altconfig_path = Some(PathBuf::from(value)),
            "--maxspeed" => cli.max_speed = Some(parse_bool(value, flag)),
            "--floppy" => cli.floppy_path = Some(PathBuf::from(value)),
            "--mouse-sensitivity" => cli.mouse_sensitivity = Some(parse_sensitivity(value)),
            other => {
                eprintln!("unrecognized argument: {other}");
                eprintln!("{USAGE}");
                process::exit(1);
            }
        }
    }

    cli
}
