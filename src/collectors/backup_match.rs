use crate::backup::BackupEntry;
use crate::config::ArtifactKind;
use crate::constants::SQLITE_HEADER;
use crate::models::MatchQuality;

/// Entry chosen from a decoded backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySelection {
    pub index: usize,
    pub quality: MatchQuality,
    pub note: Option<String>,
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches("./")
}

/// Pick the entry holding `kind` data.
///
/// Expected paths are tried in preference order. Only when none is present
/// is an entry accepted by name suffix; among those, names containing the
/// kind's keywords win, then entries that look like SQLite files, then
/// archive order. Suffix matches are marked [`MatchQuality::Heuristic`].
pub fn select_entry(
    entries: &[BackupEntry],
    expected: &[String],
    suffixes: &[String],
    kind: ArtifactKind,
) -> Option<EntrySelection> {
    for wanted in expected {
        let wanted = normalize(wanted);
        if let Some(index) = entries
            .iter()
            .position(|e| normalize(&e.path) == wanted && !e.data.is_empty())
        {
            return Some(EntrySelection { index, quality: MatchQuality::Exact, note: None });
        }
    }

    let lowered: Vec<String> = suffixes.iter().map(|s| s.to_lowercase()).collect();
    let mut best: Option<(usize, (usize, bool))> = None;
    let mut candidates = 0;

    for (index, entry) in entries.iter().enumerate() {
        let path = entry.path.to_lowercase();
        if entry.data.is_empty() || !lowered.iter().any(|s| path.ends_with(s.as_str())) {
            continue;
        }
        candidates += 1;

        let keyword_hits = kind.backup_keywords().iter().filter(|k| path.contains(*k)).count();
        let score = (keyword_hits, entry.data.starts_with(SQLITE_HEADER));
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    best.map(|(index, _)| EntrySelection {
        index,
        quality: MatchQuality::Heuristic,
        note: Some(format!(
            "no expected path present; chose {} by name suffix from {} candidate(s)",
            entries[index].path, candidates
        )),
    })
}
