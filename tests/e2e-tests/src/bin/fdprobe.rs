use clap::Parser;
use nix::fcntl::{fcntl, FcntlArg};
use std::fs;
use std::os::fd::RawFd;
use tracing::{debug, info};

/// Reports the descriptors it was started with, for launcher E2E testing
#[derive(Parser, Debug)]
#[command(name = "fdprobe")]
#[command(about = "Prints its open descriptors and exits", long_about = None)]
struct Args {
    /// Message echoed back on a `MSG` line
    #[arg(long)]
    message: Option<String>,

    /// Exit code to return after reporting
    #[arg(long, default_value = "0")]
    exit_code: i32,
}

fn main() {
    // stdout carries the report, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    info!("Starting fdprobe with args: {:?}", args);

    let fds = open_descriptors();
    debug!("Open descriptors: {:?}", fds);

    let listing: Vec<String> = fds.iter().map(|fd| fd.to_string()).collect();
    println!("FDS {}", listing.join(" "));

    if let Some(message) = &args.message {
        println!("MSG {}", message);
    }

    info!("fdprobe exiting with code {}", args.exit_code);
    std::process::exit(args.exit_code);
}

/// Lists `/proc/self/fd`, minus the descriptor used to read the listing.
fn open_descriptors() -> Vec<RawFd> {
    let listed: Vec<RawFd> = match fs::read_dir("/proc/self/fd") {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().and_then(|s| s.parse().ok()))
            .collect(),
        Err(e) => {
            eprintln!("fdprobe: cannot list /proc/self/fd: {}", e);
            std::process::exit(125);
        }
    };

    // The directory handle is closed by now; anything still valid was inherited.
    let mut fds: Vec<RawFd> = listed
        .into_iter()
        .filter(|&fd| fcntl(fd, FcntlArg::F_GETFD).is_ok())
        .collect();
    fds.sort_unstable();
    fds
}
