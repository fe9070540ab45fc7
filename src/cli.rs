use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::constants::DEFAULT_CONFIG_FILE;

/// Command-line arguments for the android-collector tool.
///
/// Global options select the configuration and evidence location; the
/// subcommand selects the operation.
#[derive(Parser, Debug)]
#[clap(
    name = "android-collector",
    version,
    about = "Android evidence acquisition, verification and timeline tool"
)]
pub struct Args {
    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,

    /// Path to configuration YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Directory holding the case directories (overrides the configuration)
    #[clap(short = 'e', long)]
    pub evidence_root: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire every configured artifact from the connected device
    Acquire {
        /// Case identifier; the case is created on first use
        case_id: String,

        /// Path to the adb executable (default: PATH, then SDK locations)
        #[clap(long)]
        adb: Option<PathBuf>,

        /// Serial of the device to use when several are connected
        #[clap(short, long)]
        serial: Option<String>,

        /// Seconds to wait for the backup confirmation on the device
        #[clap(long)]
        backup_timeout: Option<u64>,

        /// Do not export the timeline after the run
        #[clap(long)]
        no_timeline: bool,
    },

    /// Show artifacts, attempts, warnings and errors of a case
    Summary {
        case_id: String,

        /// Print JSON instead of text
        #[clap(long)]
        json: bool,
    },

    /// Re-check every artifact of a case against its recorded digest
    Verify {
        case_id: String,

        #[clap(long)]
        json: bool,
    },

    /// Print the merged timeline of a case
    Timeline {
        case_id: String,

        /// Only show records containing this text (case-insensitive)
        #[clap(long)]
        search: Option<String>,

        #[clap(long)]
        json: bool,
    },

    /// Write the timeline of a case as CSV
    Export {
        case_id: String,

        /// Output file (default: timeline.csv in the case directory)
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract a backup container file into a directory
    Decode {
        /// Backup container (.ab) to read
        input: PathBuf,

        /// Directory to extract entries into
        output: PathBuf,
    },

    /// List the cases under the evidence root
    Cases,

    /// Create a default configuration file
    InitConfig {
        /// Path to write the configuration file
        #[clap(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,
    },
}
