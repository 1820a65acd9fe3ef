//! The hunt engine: builds a set of `Hunt`s from loaded rules and
//! mappings, then runs every file in the input set through
//! `Reader -> Mapper -> solve -> hit buffer`, closing out aggregate buckets
//! once the document stream for a run ends.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rayon::prelude::*;
use serde_json::Value as Json;
use tau_engine::core::Expression;
use tau_engine::{Document, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::file::{Kind, Reader};
use crate::mapper::{MappedDocument, Mapper};
use crate::preprocess::{self, AliasDocument, AliasTable};
use crate::rule::mapping::{self, Mapping};
use crate::rule::{Aggregate, Filter, Rule, RuleKind};

/// One `(hunt_id, rule_id, timestamp)` triple.
#[derive(Clone, Debug)]
pub struct Hit {
    pub hunt_id: Uuid,
    pub rule_id: Uuid,
    pub timestamp: Option<String>,
}

/// The payload half of a `Detections` record.
pub enum DetectionKind {
    Individual(Json),
    Aggregate(Vec<Json>),
    /// `size` spans every document in this detection, concatenated
    /// contiguously at `offset` in the cache file - a single `Individual`
    /// document is one JSON value; an `Aggregate` batch is every bucket
    /// document's JSON written back to back in bucket order.
    Cached {
        kind: Kind,
        source_path: String,
        offset: u64,
        size: u64,
    },
}

pub struct Detections {
    pub hits: Vec<Hit>,
    pub kind: DetectionKind,
}

/// A `Hunt`'s evaluation strategy.
pub enum HuntKind {
    Group {
        filter: Expression,
        /// Every loaded rule this group's mapping covers, sorted by id for
        /// deterministic within-document rule order.
        candidates: Vec<Uuid>,
        exclusions: HashSet<Uuid>,
        preconditions: HashMap<Uuid, Expression>,
    },
    Rule {
        aggregate: Option<Aggregate>,
        filter: Expression,
    },
}

/// A unit of work the hunt loop evaluates against every document of a
/// matching file kind.
pub struct Hunt {
    pub id: Uuid,
    pub group: String,
    pub kind: HuntKind,
    pub mapper: Mapper,
    pub timestamp: String,
    pub file_kind: Kind,
    rule_id: Option<Uuid>,
}

/// `from`/`to` are always compared in UTC; `YYYY-MM-DDTHH:MM:SS.fZ` and bare
/// `YYYY-MM-DDTHH:MM:SS` (assumed UTC) are the two formats accepted.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    None
}

#[derive(Default)]
pub struct HunterBuilder {
    mappings: Vec<PathBuf>,
    rules: Vec<Rule>,
    load_unknown: bool,
    skip_errors: bool,
    preprocess: bool,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    timezone: Option<Tz>,
    local_time: bool,
    cache_to_disk: bool,
}

impl HunterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mappings(mut self, paths: Vec<PathBuf>) -> Self {
        self.mappings = paths;
        self
    }

    pub fn rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn load_unknown(mut self, v: bool) -> Self {
        self.load_unknown = v;
        self
    }

    pub fn skip_errors(mut self, v: bool) -> Self {
        self.skip_errors = v;
        self
    }

    pub fn preprocess(mut self, v: bool) -> Self {
        self.preprocess = v;
        self
    }

    pub fn from_timestamp(mut self, dt: DateTime<Utc>) -> Self {
        self.from = Some(dt);
        self
    }

    pub fn to_timestamp(mut self, dt: DateTime<Utc>) -> Self {
        self.to = Some(dt);
        self
    }

    pub fn timezone(mut self, tz: Tz) -> Self {
        self.timezone = Some(tz);
        self
    }

    pub fn local_time(mut self, v: bool) -> Self {
        self.local_time = v;
        self
    }

    pub fn cache_to_disk(mut self, v: bool) -> Self {
        self.cache_to_disk = v;
        self
    }

    pub fn build(self) -> Result<Hunter> {
        let mut mapping_paths = self.mappings;
        mapping_paths.sort();
        let mappings: Vec<Mapping> = mapping_paths.iter().map(|p| mapping::load(p)).collect::<Result<_>>()?;

        let mut rules = self.rules;
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        let sigma_ids: Vec<Uuid> = rules.iter().filter(|r| r.origin == RuleKind::Sigma).map(|r| r.id).collect();

        let mut hunts = Vec::new();

        for rule in &rules {
            if rule.origin != RuleKind::Chainsaw {
                continue;
            }
            hunts.push(Hunt {
                id: Uuid::new_v4(),
                group: rule.group.clone(),
                kind: HuntKind::Rule {
                    aggregate: rule.aggregate.clone(),
                    filter: rule.filter.expression().clone(),
                },
                mapper: Mapper::from_fields(&rule.fields),
                timestamp: rule.timestamp.clone(),
                file_kind: rule.kind,
                rule_id: Some(rule.id),
            });
        }

        for mapping in &mappings {
            for group in &mapping.groups {
                let exclusions: HashSet<Uuid> = rules
                    .iter()
                    .filter(|r| mapping.exclusions.contains(&r.name))
                    .map(|r| r.id)
                    .collect();

                let mut preconditions = HashMap::new();
                for precondition in &mapping.preconditions {
                    for rule in &rules {
                        if rule.origin == RuleKind::Sigma && rule.matches_precondition(&precondition.for_) {
                            preconditions.insert(rule.id, precondition.filter.clone());
                        }
                    }
                }

                hunts.push(Hunt {
                    id: group.id,
                    group: group.name.clone(),
                    kind: HuntKind::Group {
                        filter: group.filter.clone(),
                        candidates: sigma_ids.clone(),
                        exclusions,
                        preconditions,
                    },
                    mapper: Mapper::from_fields(&group.fields),
                    timestamp: group.timestamp.clone(),
                    file_kind: mapping.kind,
                    rule_id: None,
                });
            }
        }

        let alias_table = if self.preprocess {
            let mut names = HashSet::new();
            for hunt in &hunts {
                names.insert(hunt.timestamp.clone());
                match &hunt.kind {
                    HuntKind::Rule { filter, aggregate, .. } => {
                        preprocess::collect_field_names(filter, &mut names);
                        if let Some(agg) = aggregate {
                            names.extend(agg.fields.iter().cloned());
                        }
                    }
                    HuntKind::Group { filter, preconditions, .. } => {
                        preprocess::collect_field_names(filter, &mut names);
                        for p in preconditions.values() {
                            preprocess::collect_field_names(p, &mut names);
                        }
                    }
                }
            }
            let table = AliasTable::build(&names);
            for hunt in &mut hunts {
                hunt.timestamp = table.alias_of(&hunt.timestamp);
                match &mut hunt.kind {
                    HuntKind::Rule { filter, aggregate, .. } => {
                        *filter = preprocess::update_fields(std::mem::replace(filter, Expression::Null), &table);
                        if let Some(agg) = aggregate {
                            agg.fields = agg.fields.iter().map(|f| table.alias_of(f)).collect();
                        }
                    }
                    HuntKind::Group { filter, preconditions, .. } => {
                        *filter = preprocess::update_fields(std::mem::replace(filter, Expression::Null), &table);
                        for p in preconditions.values_mut() {
                            *p = preprocess::update_fields(std::mem::replace(p, Expression::Null), &table);
                        }
                    }
                }
            }
            Some(table)
        } else {
            None
        };

        let rules: HashMap<Uuid, Rule> = rules.into_iter().map(|r| (r.id, r)).collect();

        Ok(Hunter {
            hunts,
            rules,
            load_unknown: self.load_unknown,
            skip_errors: self.skip_errors,
            from: self.from,
            to: self.to,
            timezone: self.timezone,
            local_time: self.local_time,
            cache: if self.cache_to_disk { Some(Mutex::new(CacheWriter::new()?)) } else { None },
            alias_table,
        })
    }
}

/// Either a plain `MappedDocument` or one further wrapped for the
/// `preprocess` alias rewrite, unified behind one `Document` impl so
/// `hunt_file` doesn't need to juggle two borrowed-temporary lifetimes.
enum DocumentView<'a> {
    Mapped(MappedDocument<'a>),
    Aliased(AliasDocument<'a>),
}

impl<'a> Document for DocumentView<'a> {
    fn find(&self, key: &str) -> Option<Value<'_>> {
        match self {
            Self::Mapped(doc) => doc.find(key),
            Self::Aliased(doc) => doc.find(key),
        }
    }
}

struct CacheWriter {
    file: File,
    offset: u64,
}

impl CacheWriter {
    fn new() -> Result<Self> {
        let file = tempfile::tempfile().map_err(|e| Error::Io {
            path: PathBuf::from("<cache>"),
            source: e,
        })?;
        Ok(Self { file, offset: 0 })
    }

    fn write_all(&mut self, values: &[Json]) -> Result<(u64, u64)> {
        let start = self.offset;
        let mut total = 0u64;
        for value in values {
            let bytes = serde_json::to_vec(value).map_err(|e| Error::ParseError {
                path: PathBuf::from("<cache>"),
                message: e.to_string(),
            })?;
            self.file.write_all(&bytes).map_err(|e| Error::Io {
                path: PathBuf::from("<cache>"),
                source: e,
            })?;
            total += bytes.len() as u64;
        }
        self.offset += total;
        Ok((start, total))
    }
}

/// Accumulated aggregate-bucket state for one hunt run. Keyed by
/// `(hunt_id, rule_id, bincode-encoded field tuple)` - a binary encoding
/// avoids delimiter collisions a string-joined key would risk.
type BucketKey = (Uuid, Uuid, Vec<u8>);

#[derive(Default)]
struct Buckets {
    documents: HashMap<BucketKey, Vec<Json>>,
    hits: HashMap<BucketKey, Vec<Hit>>,
}

/// Built, read-only hunt set plus the rule registry it references by id.
/// Safe to share by reference across workers.
pub struct Hunter {
    hunts: Vec<Hunt>,
    rules: HashMap<Uuid, Rule>,
    load_unknown: bool,
    skip_errors: bool,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    timezone: Option<Tz>,
    local_time: bool,
    cache: Option<Mutex<CacheWriter>>,
    alias_table: Option<AliasTable>,
}

impl Hunter {
    pub fn hunts(&self) -> &[Hunt] {
        &self.hunts
    }

    pub fn rules(&self) -> &HashMap<Uuid, Rule> {
        &self.rules
    }

    /// Render a UTC timestamp for display, honouring the builder's
    /// `timezone`/`local_time` choice. Purely cosmetic - time-window
    /// filtering always compares in UTC.
    fn render_timestamp(&self, utc: DateTime<Utc>) -> String {
        if let Some(tz) = self.timezone {
            return utc.with_timezone(&tz).to_rfc3339();
        }
        if self.local_time {
            return utc.with_timezone(&chrono::Local).to_rfc3339();
        }
        utc.to_rfc3339()
    }

    /// Hunt every file in `paths`, in parallel across files with no shared
    /// mutable state between workers except the cache-to-disk mutex.
    /// Aggregate buckets from every file are merged once the full file set
    /// has been processed.
    pub fn hunt(&self, paths: &[PathBuf]) -> Result<Vec<Detections>> {
        let per_file: Vec<Result<(Vec<Detections>, Buckets)>> =
            paths.par_iter().map(|path| self.hunt_file(path)).collect();

        let mut detections = Vec::new();
        let mut merged = Buckets::default();
        for result in per_file {
            match result {
                Ok((file_detections, buckets)) => {
                    detections.extend(file_detections);
                    for (key, docs) in buckets.documents {
                        merged.documents.entry(key.clone()).or_default().extend(docs);
                    }
                    for (key, hits) in buckets.hits {
                        merged.hits.entry(key).or_default().extend(hits);
                    }
                }
                Err(e) if self.skip_errors => {
                    tracing::warn!(error = %e, "skipping file after hunt error");
                }
                Err(e) => return Err(e),
            }
        }

        detections.extend(self.finalize_buckets(merged)?);
        Ok(detections)
    }

    fn finalize_buckets(&self, buckets: Buckets) -> Result<Vec<Detections>> {
        let mut out = Vec::new();
        for (key, docs) in buckets.documents {
            let (_hunt_id, rule_id, _) = &key;
            let Some(rule) = self.rules.get(rule_id) else { continue };
            let Some(aggregate) = &rule.aggregate else { continue };
            if !aggregate.count.matches(docs.len() as u64) {
                continue;
            }
            let hits = buckets.hits.get(&key).cloned().unwrap_or_default();
            let kind = if let Some(cache) = &self.cache {
                let mut writer = cache.lock().expect("cache writer poisoned");
                let (offset, size) = writer.write_all(&docs)?;
                // A bucket can span several input files once merged; there
                // is no single `source_path` left to report here.
                DetectionKind::Cached {
                    kind: rule.kind,
                    source_path: String::new(),
                    offset,
                    size,
                }
            } else {
                DetectionKind::Aggregate(docs)
            };
            out.push(Detections { hits, kind });
        }
        Ok(out)
    }

    /// Hunt one file sequentially: open its `Reader`, evaluate every
    /// applicable `Hunt` against every document, and return this file's
    /// non-aggregating detections plus its (not yet finalised) bucket state.
    fn hunt_file(&self, path: &Path) -> Result<(Vec<Detections>, Buckets)> {
        let reader = match Reader::open(path, self.load_unknown, self.skip_errors) {
            Ok(reader) => reader,
            Err(e) if self.skip_errors => {
                tracing::warn!(error = %e, path = %path.display(), "skipping file");
                return Ok((Vec::new(), Buckets::default()));
            }
            Err(e) => return Err(e),
        };

        let mut detections = Vec::new();
        let mut buckets = Buckets::default();
        let source_path = path.display().to_string();

        for record in reader {
            for hunt in &self.hunts {
                if hunt.file_kind != Kind::Unknown && record.kind != hunt.file_kind {
                    continue;
                }

                let raw_timestamp = record.find(&hunt.timestamp).and_then(|v| v.to_string());
                let parsed = raw_timestamp.as_deref().and_then(parse_timestamp);
                if let Some(ts) = parsed {
                    if let Some(from) = self.from {
                        if ts < from {
                            continue;
                        }
                    }
                    if let Some(to) = self.to {
                        if ts > to {
                            continue;
                        }
                    }
                }
                let display_timestamp = parsed.map(|ts| self.render_timestamp(ts)).or_else(|| raw_timestamp.clone());

                let mapped = MappedDocument::new(&record, &hunt.mapper);
                let view = match &self.alias_table {
                    Some(table) => DocumentView::Aliased(AliasDocument::new(&mapped, table)),
                    None => DocumentView::Mapped(mapped),
                };
                let document: &dyn Document = &view;

                match &hunt.kind {
                    HuntKind::Rule { aggregate, filter } => {
                        if !tau_engine::solve(filter, document) {
                            continue;
                        }
                        let rule_id = hunt.rule_id.expect("Rule hunts always carry a rule id");
                        let hit = Hit {
                            hunt_id: hunt.id,
                            rule_id,
                            timestamp: display_timestamp.clone(),
                        };
                        match aggregate {
                            Some(agg) => {
                                let key = bucket_key(hunt.id, rule_id, agg, document);
                                buckets.documents.entry(key.clone()).or_default().push(record.value.clone());
                                buckets.hits.entry(key).or_default().push(hit);
                            }
                            None => {
                                let kind = self.emit_individual(record.kind, &source_path, &record.value)?;
                                detections.push(Detections { hits: vec![hit], kind });
                            }
                        }
                    }
                    HuntKind::Group { filter, candidates, exclusions, preconditions } => {
                        if !tau_engine::solve(filter, document) {
                            continue;
                        }
                        for rule_id in candidates {
                            if exclusions.contains(rule_id) {
                                continue;
                            }
                            if let Some(precondition) = preconditions.get(rule_id) {
                                if !tau_engine::solve(precondition, document) {
                                    continue;
                                }
                            }
                            let Some(rule) = self.rules.get(rule_id) else { continue };
                            if !tau_engine::solve(rule.filter.expression(), document) {
                                continue;
                            }
                            let hit = Hit {
                                hunt_id: hunt.id,
                                rule_id: *rule_id,
                                timestamp: display_timestamp.clone(),
                            };
                            match &rule.aggregate {
                                Some(agg) => {
                                    let key = bucket_key(hunt.id, *rule_id, agg, document);
                                    buckets.documents.entry(key.clone()).or_default().push(record.value.clone());
                                    buckets.hits.entry(key).or_default().push(hit);
                                }
                                None => {
                                    let kind = self.emit_individual(record.kind, &source_path, &record.value)?;
                                    detections.push(Detections { hits: vec![hit], kind });
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok((detections, buckets))
    }

    fn emit_individual(&self, kind: Kind, source_path: &str, value: &Json) -> Result<DetectionKind> {
        match &self.cache {
            Some(cache) => {
                let mut writer = cache.lock().expect("cache writer poisoned");
                let (offset, size) = writer.write_all(std::slice::from_ref(value))?;
                Ok(DetectionKind::Cached {
                    kind,
                    source_path: source_path.to_string(),
                    offset,
                    size,
                })
            }
            None => Ok(DetectionKind::Individual(value.clone())),
        }
    }
}

fn bucket_key(hunt_id: Uuid, rule_id: Uuid, aggregate: &Aggregate, document: &dyn Document) -> BucketKey {
    let values: Vec<Option<String>> = aggregate.fields.iter().map(|f| document.find(f).and_then(|v| v.to_string())).collect();
    let encoded = bincode::serialize(&values).unwrap_or_default();
    (hunt_id, rule_id, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Level, Logsource, Status};
    use std::fs;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn chainsaw_rule(name: &str, timestamp: &str, filter: &str, aggregate: Option<Aggregate>) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            origin: RuleKind::Chainsaw,
            name: name.to_string(),
            group: "test".to_string(),
            authors: vec!["tester".to_string()],
            kind: Kind::Json,
            level: Level::High,
            status: Status::Stable,
            timestamp: timestamp.to_string(),
            fields: Vec::new(),
            filter: Filter::Expression(tau_engine::parse_expression(filter).unwrap()),
            aggregate,
            logsource: Logsource::default(),
        }
    }

    #[test]
    fn standalone_rule_hunts_match_a_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.json", r#"{"EventID": 4688, "ts": "2024-01-01T00:00:00Z"}"#);

        let rule = chainsaw_rule("Process creation", "ts", "int(EventID) == 4688", None);
        let hunter = HunterBuilder::new().rules(vec![rule]).build().unwrap();

        let detections = hunter.hunt(&[path]).unwrap();
        assert_eq!(detections.len(), 1);
        assert!(matches!(detections[0].kind, DetectionKind::Individual(_)));
    }

    #[test]
    fn time_window_excludes_documents_outside_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.json", r#"{"EventID": 4688, "ts": "2020-01-01T00:00:00Z"}"#);

        let rule = chainsaw_rule("Process creation", "ts", "int(EventID) == 4688", None);
        let hunter = HunterBuilder::new()
            .rules(vec![rule])
            .from_timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .build()
            .unwrap();

        let detections = hunter.hunt(&[path]).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn aggregate_rule_emits_one_hit_per_satisfying_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "a.jsonl",
            "{\"Computer\": \"A\", \"ts\": \"2024-01-01T00:00:00Z\"}\n\
             {\"Computer\": \"A\", \"ts\": \"2024-01-01T00:00:01Z\"}\n\
             {\"Computer\": \"B\", \"ts\": \"2024-01-01T00:00:02Z\"}\n\
             {\"Computer\": \"A\", \"ts\": \"2024-01-01T00:00:03Z\"}\n\
             {\"Computer\": \"B\", \"ts\": \"2024-01-01T00:00:04Z\"}\n",
        );

        let mut rule = chainsaw_rule("Computer bursts", "ts", "str(Computer) == \"A\" or str(Computer) == \"B\"", None);
        rule.kind = Kind::Jsonl;
        rule.aggregate = Some(Aggregate {
            count: crate::rule::CountPattern::GreaterThanOrEqual(3),
            fields: vec!["Computer".to_string()],
        });

        let hunter = HunterBuilder::new().rules(vec![rule]).build().unwrap();
        let detections = hunter.hunt(&[path]).unwrap();

        assert_eq!(detections.len(), 1);
        match &detections[0].kind {
            DetectionKind::Aggregate(docs) => assert_eq!(docs.len(), 3),
            _ => panic!("expected an aggregate detection"),
        }
        assert_eq!(detections[0].hits.len(), 3);
    }

    fn sigma_rule(name: &str, level: Level, filter: &str) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            origin: RuleKind::Sigma,
            name: name.to_string(),
            group: String::new(),
            authors: vec!["unknown".to_string()],
            kind: Kind::Unknown,
            level,
            status: Status::Stable,
            timestamp: String::new(),
            fields: Vec::new(),
            filter: Filter::Expression(tau_engine::parse_expression(filter).unwrap()),
            aggregate: None,
            logsource: Logsource::default(),
        }
    }

    #[test]
    fn group_hunt_respects_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let mapping_path = write(
            &dir,
            "mapping.yml",
            r#"
kind: json
rules: sigma
exclusions:
  - Excluded rule
groups:
  - name: Everything
    timestamp: ts
    filter: "EventID != null"
"#,
        );

        let matching = sigma_rule("Matching rule", Level::Medium, "int(EventID) == 4688");
        let excluded = sigma_rule("Excluded rule", Level::Medium, "int(EventID) == 4688");

        let doc_path = write(&dir, "a.json", r#"{"EventID": 4688, "ts": "2024-01-01T00:00:00Z"}"#);

        let hunter = HunterBuilder::new()
            .mappings(vec![mapping_path])
            .rules(vec![matching, excluded])
            .build()
            .unwrap();

        let detections = hunter.hunt(&[doc_path]).unwrap();
        assert_eq!(detections.len(), 1);
        let hit = &detections[0].hits[0];
        assert_eq!(hunter.rules().get(&hit.rule_id).unwrap().name, "Matching rule");
    }

    #[test]
    fn group_hunt_suppresses_a_rule_whose_precondition_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mapping_path = write(
            &dir,
            "mapping.yml",
            r#"
kind: json
rules: sigma
extensions:
  preconditions:
    - for:
        level: high
      filter: "int(EventID) == 9999"
groups:
  - name: Everything
    timestamp: ts
    filter: "EventID != null"
"#,
        );

        let gated = sigma_rule("Gated rule", Level::High, "int(EventID) == 4688");

        let doc_path = write(&dir, "a.json", r#"{"EventID": 4688, "ts": "2024-01-01T00:00:00Z"}"#);

        let hunter = HunterBuilder::new().mappings(vec![mapping_path]).rules(vec![gated]).build().unwrap();

        // The rule's own filter matches, but its precondition (EventID ==
        // 9999) does not, so it never fires.
        let detections = hunter.hunt(&[doc_path]).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn preprocess_rewrites_fields_without_changing_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.json", r#"{"EventID": 4688, "ts": "2024-01-01T00:00:00Z"}"#);

        let rule = chainsaw_rule("Process creation", "ts", "int(EventID) == 4688", None);
        let hunter = HunterBuilder::new().rules(vec![rule]).preprocess(true).build().unwrap();

        let detections = hunter.hunt(&[path]).unwrap();
        assert_eq!(detections.len(), 1);
    }

}
