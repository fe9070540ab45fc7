use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of evidence the engine knows how to acquire
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    Sms,
    CallLog,
    BrowserHistory,
    Contacts,
    Calendar,
    UserDictionary,
    AppUsage,
    InstalledApps,
    SharedStorage,
}

impl ArtifactKind {
    /// Every kind, in the fixed processing order
    pub const ALL: [ArtifactKind; 9] = [
        ArtifactKind::Sms,
        ArtifactKind::CallLog,
        ArtifactKind::BrowserHistory,
        ArtifactKind::Contacts,
        ArtifactKind::Calendar,
        ArtifactKind::UserDictionary,
        ArtifactKind::AppUsage,
        ArtifactKind::InstalledApps,
        ArtifactKind::SharedStorage,
    ];

    /// Stable name used for directories, exports and tie-breaking
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::Sms => "SMS",
            ArtifactKind::CallLog => "CallLog",
            ArtifactKind::BrowserHistory => "BrowserHistory",
            ArtifactKind::Contacts => "Contacts",
            ArtifactKind::Calendar => "Calendar",
            ArtifactKind::UserDictionary => "UserDictionary",
            ArtifactKind::AppUsage => "AppUsage",
            ArtifactKind::InstalledApps => "InstalledApps",
            ArtifactKind::SharedStorage => "SharedStorage",
        }
    }

    /// Tables of which at least one must exist in a relational artifact
    pub fn required_tables(&self) -> &'static [&'static str] {
        match self {
            ArtifactKind::Sms => &["sms"],
            ArtifactKind::CallLog => &["calls"],
            ArtifactKind::BrowserHistory => &["urls"],
            ArtifactKind::Contacts => &["raw_contacts", "contacts"],
            ArtifactKind::Calendar => &["Events"],
            ArtifactKind::UserDictionary => &["words"],
            ArtifactKind::SharedStorage => &["files"],
            ArtifactKind::AppUsage | ArtifactKind::InstalledApps => &[],
        }
    }

    /// Lines that identify a free-text dump of this kind
    pub fn dump_markers(&self) -> &'static [&'static str] {
        match self {
            ArtifactKind::AppUsage => &["package=", "Last 24 hour events", "In-memory daily stats"],
            ArtifactKind::InstalledApps => &["Package [", "Packages:"],
            _ => &[],
        }
    }

    /// Words that make a backup entry a better heuristic match for this kind
    pub fn backup_keywords(&self) -> &'static [&'static str] {
        match self {
            ArtifactKind::Sms => &["sms", "mms", "telephony"],
            ArtifactKind::CallLog => &["call"],
            ArtifactKind::BrowserHistory => &["chrome", "history", "browser"],
            ArtifactKind::Contacts => &["contacts"],
            ArtifactKind::Calendar => &["calendar"],
            ArtifactKind::UserDictionary => &["dict"],
            ArtifactKind::SharedStorage => &["media", "external"],
            ArtifactKind::AppUsage | ArtifactKind::InstalledApps => &[],
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Tag of an acquisition method, as recorded in the attempt log
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    DirectCopy,
    Backup,
    ContentQuery,
    SystemDump,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::DirectCopy => write!(f, "DirectCopy"),
            MethodKind::Backup => write!(f, "Backup"),
            MethodKind::ContentQuery => write!(f, "ContentQuery"),
            MethodKind::SystemDump => write!(f, "SystemDump"),
        }
    }
}

/// One acquisition strategy with its parameters
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "method")]
pub enum AcquisitionMethod {
    /// Copy the target's candidate locations using elevated access
    DirectCopy,
    /// Create a backup container for `package` and pick a matching entry
    Backup {
        package: String,
        /// Archive-internal paths, most preferred first
        entries: Vec<String>,
        /// Name suffixes accepted as a last resort (e.g. ".db")
        #[serde(default)]
        fallback_suffixes: Vec<String>,
    },
    /// Query a managed content provider
    ContentQuery { uri: String },
    /// Capture a diagnostic dump of a system service
    SystemDump { service: String },
}

impl AcquisitionMethod {
    pub fn kind(&self) -> MethodKind {
        match self {
            AcquisitionMethod::DirectCopy => MethodKind::DirectCopy,
            AcquisitionMethod::Backup { .. } => MethodKind::Backup,
            AcquisitionMethod::ContentQuery { .. } => MethodKind::ContentQuery,
            AcquisitionMethod::SystemDump { .. } => MethodKind::SystemDump,
        }
    }

    /// On-disk shape of what this method produces
    pub fn format(&self) -> ArtifactFormat {
        match self {
            AcquisitionMethod::DirectCopy | AcquisitionMethod::Backup { .. } => ArtifactFormat::Database,
            AcquisitionMethod::ContentQuery { .. } => ArtifactFormat::ContentRows,
            AcquisitionMethod::SystemDump { .. } => ArtifactFormat::TextDump,
        }
    }
}

/// Physical format of an acquired artifact
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactFormat {
    /// SQLite database file
    Database,
    /// Content query rows stored one JSON object per line
    ContentRows,
    /// Free text from a system service dump
    TextDump,
}
