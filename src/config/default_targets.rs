use crate::config::artifact_types::{AcquisitionMethod, ArtifactKind};
use crate::config::engine_config::{AcquisitionTarget, EngineConfig};

fn backup(package: &str, entries: &[&str], fallback_suffixes: &[&str]) -> AcquisitionMethod {
    AcquisitionMethod::Backup {
        package: package.into(),
        entries: entries.iter().map(|e| e.to_string()).collect(),
        fallback_suffixes: fallback_suffixes.iter().map(|s| s.to_string()).collect(),
    }
}

fn query(uri: &str) -> AcquisitionMethod {
    AcquisitionMethod::ContentQuery { uri: uri.into() }
}

fn dump(service: &str) -> AcquisitionMethod {
    AcquisitionMethod::SystemDump { service: service.into() }
}

impl EngineConfig {
    /// Built-in targets covering every artifact kind
    pub fn default_targets() -> Vec<AcquisitionTarget> {
        vec![
            AcquisitionTarget {
                kind: ArtifactKind::Sms,
                sources: vec![
                    "/data/data/com.android.providers.telephony/databases/mmssms.db".into(),
                    "/data/data/com.android.mms/databases/mmssms.db".into(),
                ],
                methods: vec![
                    AcquisitionMethod::DirectCopy,
                    backup(
                        "com.android.providers.telephony",
                        &[
                            "apps/com.android.providers.telephony/db/mmssms.db",
                            "apps/com.android.mms/db/mmssms.db",
                        ],
                        &[".db"],
                    ),
                    query("content://sms"),
                ],
            },
            AcquisitionTarget {
                kind: ArtifactKind::CallLog,
                sources: vec![
                    "/data/data/com.android.providers.contacts/databases/calllog.db".into(),
                    "/data/data/com.android.providers.contacts/databases/contacts2.db".into(),
                ],
                methods: vec![
                    AcquisitionMethod::DirectCopy,
                    backup(
                        "com.android.providers.contacts",
                        &[
                            "apps/com.android.providers.contacts/db/calllog.db",
                            "apps/com.android.providers.contacts/db/contacts2.db",
                        ],
                        &[".db"],
                    ),
                    query("content://call_log/calls"),
                ],
            },
            AcquisitionTarget {
                kind: ArtifactKind::BrowserHistory,
                sources: vec![
                    "/data/data/com.android.chrome/app_chrome/Default/History".into(),
                    "/data/data/com.chrome.browser/app_chrome/Default/History".into(),
                ],
                methods: vec![
                    AcquisitionMethod::DirectCopy,
                    backup(
                        "com.android.chrome",
                        &["apps/com.android.chrome/f/app_chrome/Default/History"],
                        &["History"],
                    ),
                ],
            },
            AcquisitionTarget {
                kind: ArtifactKind::Contacts,
                sources: vec!["/data/data/com.android.providers.contacts/databases/contacts2.db".into()],
                methods: vec![
                    AcquisitionMethod::DirectCopy,
                    backup(
                        "com.android.providers.contacts",
                        &["apps/com.android.providers.contacts/db/contacts2.db"],
                        &[".db"],
                    ),
                    query("content://com.android.contacts/data/phones"),
                ],
            },
            AcquisitionTarget {
                kind: ArtifactKind::Calendar,
                sources: vec!["/data/data/com.android.providers.calendar/databases/calendar.db".into()],
                methods: vec![
                    AcquisitionMethod::DirectCopy,
                    query("content://com.android.calendar/events"),
                ],
            },
            AcquisitionTarget {
                kind: ArtifactKind::UserDictionary,
                sources: vec![
                    "/data/data/com.android.providers.userdictionary/databases/user_dict.db".into(),
                ],
                methods: vec![
                    AcquisitionMethod::DirectCopy,
                    query("content://user_dictionary/words"),
                ],
            },
            AcquisitionTarget {
                kind: ArtifactKind::AppUsage,
                sources: vec![],
                methods: vec![dump("usagestats")],
            },
            AcquisitionTarget {
                kind: ArtifactKind::InstalledApps,
                sources: vec![],
                methods: vec![dump("package")],
            },
            AcquisitionTarget {
                kind: ArtifactKind::SharedStorage,
                sources: vec!["/data/data/com.android.providers.media/databases/external.db".into()],
                methods: vec![
                    AcquisitionMethod::DirectCopy,
                    query("content://media/external/file"),
                ],
            },
        ]
    }
}
