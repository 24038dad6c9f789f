use std::fs;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use zlogscope_types::SymbolTag;

use crate::error::{RecoveryError, Result};

/// `ctags -x` cross reference line: name, kind, line, file, source text
const CTAGS_LINE: &str = r"^(?P<name>.+?)\s+function\s+(?P<line>\S+)\s+(?P<path>\S+)";

/// Longer names are declarations ctags split badly, e.g. `operator new []`
const MAX_NAME_WORDS: usize = 2;

/// Known function definitions, immutable once loaded.
///
/// Tags keep their load order; that order breaks ties during recovery.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    tags: Vec<SymbolTag>,
    /// Indices into `tags`, stably sorted by name
    by_name: Vec<usize>,
}

#[derive(Deserialize)]
struct JsonTag {
    name: String,
    path: String,
    defined_at: u32,
}

impl SymbolTable {
    pub fn new(tags: Vec<SymbolTag>) -> Self {
        let mut by_name: Vec<usize> = (0..tags.len()).collect();
        by_name.sort_by(|&a, &b| tags[a].name.cmp(&tags[b].name));
        Self { tags, by_name }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> &[SymbolTag] {
        &self.tags
    }

    /// Hash of every tag in order; identifies the table a saved memo was
    /// built against
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tags.hash(&mut hasher);
        hasher.finish()
    }

    /// Every tag whose name starts with `prefix`, in table order
    pub fn candidates(&self, prefix: &str) -> Vec<&SymbolTag> {
        let start = self
            .by_name
            .partition_point(|&i| self.tags[i].name.as_str() < prefix);
        let mut hits: Vec<usize> = self.by_name[start..]
            .iter()
            .copied()
            .take_while(|&i| self.tags[i].name.starts_with(prefix))
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|i| &self.tags[i]).collect()
    }

    /// Load a table, picking the format from the file extension: `.json`,
    /// `.tsv`, anything else is treated as `ctags -x` output
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| RecoveryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::parse_json(&text).map_err(|source| RecoveryError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            Some("tsv") => Self::parse_tsv(&text)?,
            _ => Self::parse_ctags(&text)?,
        };
        info!(tags = table.len(), "loaded symbol table {}", path.display());
        Ok(table)
    }

    /// Parse `ctags -x` output, keeping function definitions only
    pub fn parse_ctags(text: &str) -> Result<Self> {
        let pattern = Regex::new(CTAGS_LINE)?;
        let mut tags = Vec::new();
        for line in text.lines() {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            let name = caps["name"].trim();
            if name.split_whitespace().count() > MAX_NAME_WORDS {
                debug!("skipping tag with odd name: {name}");
                continue;
            }
            let Ok(defined_at) = caps["line"].parse::<u32>() else {
                continue;
            };
            tags.push(SymbolTag::new(name, &caps["path"], defined_at));
        }
        Ok(Self::new(tags))
    }

    /// Parse `name<TAB>path<TAB>line` records. Blank lines and `#` comments
    /// are ignored.
    pub fn parse_tsv(text: &str) -> Result<Self> {
        let mut tags = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let invalid = |reason: &str| RecoveryError::InvalidRecord {
                line: idx + 1,
                reason: reason.to_string(),
            };
            let mut cols = line.split('\t');
            let (Some(name), Some(path), Some(defined_at)) = (cols.next(), cols.next(), cols.next())
            else {
                return Err(invalid("expected name, path and line columns"));
            };
            let defined_at = defined_at
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid("line column is not a number"))?;
            tags.push(SymbolTag::new(name.trim(), path.trim(), defined_at));
        }
        Ok(Self::new(tags))
    }

    /// Parse a JSON array of `{"name", "path", "defined_at"}` objects
    pub fn parse_json(text: &str) -> serde_json::Result<Self> {
        let records: Vec<JsonTag> = serde_json::from_str(text)?;
        Ok(Self::new(
            records
                .into_iter()
                .map(|r| SymbolTag::new(r.name, r.path, r.defined_at))
                .collect(),
        ))
    }
}

impl FromIterator<SymbolTag> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = SymbolTag>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(hits: &[&SymbolTag]) -> Vec<String> {
        hits.iter()
            .map(|t| format!("{}@{}", t.name, t.defined_at))
            .collect()
    }

    #[test]
    fn test_candidates_keep_table_order() {
        let table: SymbolTable = [
            SymbolTag::new("ProcessFinalBlock", "Node.cpp", 529),
            SymbolTag::new("Process", "Node.cpp", 10),
            SymbolTag::new("ProcessDSBlock", "DS.cpp", 40),
            SymbolTag::new("Other", "Node.cpp", 1),
            SymbolTag::new("ProcessFinalBlock", "Node.cpp", 582),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            names(&table.candidates("ProcessF")),
            vec!["ProcessFinalBlock@529", "ProcessFinalBlock@582"]
        );
        assert_eq!(table.candidates("Process").len(), 4);
        assert!(table.candidates("Zzz").is_empty());
        assert_eq!(table.candidates("").len(), 5);
    }

    #[test]
    fn test_parse_ctags() {
        let text = "\
Node::ProcessFinalBlock function    529 libNode/FinalBlockProcessing.cpp bool Node::ProcessFinalBlock(
operator () function    111 libData/GetTxnFromFile.h bool operator()(
operator new [] function 12 libUtils/Alloc.cpp void* operator new[](
m_mutex          member      88 libNode/Node.h std::mutex m_mutex;
Broken           function   ??? libNode/Node.cpp void Broken(
";
        let table = SymbolTable::parse_ctags(text).unwrap();
        assert_eq!(
            table.tags(),
            &[
                SymbolTag::new(
                    "Node::ProcessFinalBlock",
                    "libNode/FinalBlockProcessing.cpp",
                    529
                ),
                SymbolTag::new("operator ()", "libData/GetTxnFromFile.h", 111),
            ]
        );
    }

    #[test]
    fn test_parse_tsv() {
        let text = "# name\tpath\tline\nInitTemp\tlibData/AccountStore.cpp\t64\n\nPutBlock\tlibPersistence/BlockStorage.cpp\t50\n";
        let table = SymbolTable::parse_tsv(text).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.tags()[1].defined_at, 50);

        assert!(matches!(
            SymbolTable::parse_tsv("InitTemp\tAccountStore.cpp\tsixty-four"),
            Err(RecoveryError::InvalidRecord { line: 1, .. })
        ));
        assert!(matches!(
            SymbolTable::parse_tsv("ok\ta.cpp\t1\nmissing-columns"),
            Err(RecoveryError::InvalidRecord { line: 2, .. })
        ));
    }

    #[test]
    fn test_from_path_by_extension() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("tags.json");
        fs::write(
            &json,
            r#"[{"name": "CommitTemp", "path": "libData/AccountStore.cpp", "defined_at": 358}]"#,
        )
        .unwrap();
        let table = SymbolTable::from_path(&json).unwrap();
        assert_eq!(
            table.tags(),
            &[SymbolTag::new("CommitTemp", "libData/AccountStore.cpp", 358)]
        );

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        assert!(matches!(
            SymbolTable::from_path(&broken),
            Err(RecoveryError::Json { .. })
        ));

        assert!(matches!(
            SymbolTable::from_path(&dir.path().join("absent.tags")),
            Err(RecoveryError::Io { .. })
        ));
    }
}
