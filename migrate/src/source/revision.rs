use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, MigrateResult};
use crate::source::query::{Dataset, SortDirection, SourceQuery};
use crate::source::Source;
use crate::types::{IdFieldDefinition, Row, Value};

/// Reconstructs historical (revision, translation) pairs from a flat table.
///
/// A legacy schema that stores one row per revision, where translations are
/// sibling entities sharing a set key, flattens away the question "what did
/// each translation look like when revision R was current". This source
/// answers it: for every revision R of a set and every language L known to
/// the set, it emits one row pairing R with the *latest* revision of L that
/// existed at or before R.
///
/// With revisions `v1(en), v2(fr), v3(de), v4(en)` of one set, the emitted
/// rows for `v3` pair it with `{en: v1, fr: v2, de: v3}` and the rows for
/// `v4` with `{en: v4, fr: v2, de: v3}`.
///
/// Each emitted row carries the content properties of the paired translation
/// revision, with the claimed revision, language, and set entity id written
/// over them; the paired revision itself stays available as
/// `content_revision`. Output is ordered by (revision, language) so the
/// reconstruction is reproducible.
pub struct RevisionTranslationSource {
    dataset: Dataset,
    table: String,
    entity_field: String,
    revision_field: String,
    language_field: String,
    set_field: Option<String>,
    fields: BTreeMap<String, String>,
    buffer: VecDeque<BTreeMap<String, Value>>,
    opened: bool,
}

impl RevisionTranslationSource {
    pub fn new(
        dataset: Dataset,
        table: impl Into<String>,
        entity_field: impl Into<String>,
        revision_field: impl Into<String>,
        language_field: impl Into<String>,
    ) -> Self {
        Self {
            dataset,
            table: table.into(),
            entity_field: entity_field.into(),
            revision_field: revision_field.into(),
            language_field: language_field.into(),
            set_field: None,
            fields: BTreeMap::new(),
            buffer: VecDeque::new(),
            opened: false,
        }
    }

    /// Names the translation-set key field. A zero or missing set key means
    /// the row's entity is its own set.
    pub fn with_set_field(mut self, set_field: impl Into<String>) -> Self {
        self.set_field = Some(set_field.into());
        self
    }

    /// Documents one available field.
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.fields.insert(name.into(), description.into());
        self
    }

    fn set_id_of(&self, row: &BTreeMap<String, Value>) -> Option<i64> {
        let entity = row.get(&self.entity_field).and_then(Value::as_i64)?;
        let set = self
            .set_field
            .as_ref()
            .and_then(|field| row.get(field))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        Some(if set != 0 { set } else { entity })
    }

    /// Runs the as-of reconstruction over the raw table.
    fn reconstruct(&self) -> MigrateResult<Vec<BTreeMap<String, Value>>> {
        let Some(rows) = self.dataset.table(&self.table) else {
            bail!(
                ErrorKind::SourceUnavailable,
                "Revision table is not provided by the source system",
                self.table.clone()
            );
        };

        // Group revision rows into translation sets.
        let mut sets: BTreeMap<i64, Vec<&BTreeMap<String, Value>>> = BTreeMap::new();
        for row in rows {
            let Some(set_id) = self.set_id_of(row) else {
                bail!(
                    ErrorKind::ConversionError,
                    "Revision row has no numeric entity id",
                    self.entity_field.clone()
                );
            };
            sets.entry(set_id).or_default().push(row);
        }

        let mut output = Vec::new();
        for (set_id, members) in &sets {
            let revision_of = |row: &BTreeMap<String, Value>| {
                row.get(&self.revision_field).and_then(Value::as_i64)
            };
            let language_of = |row: &BTreeMap<String, Value>| {
                row.get(&self.language_field)
                    .and_then(Value::to_display_string)
            };

            let mut revisions: Vec<i64> = members.iter().filter_map(|row| revision_of(row)).collect();
            revisions.sort_unstable();
            revisions.dedup();

            let mut languages: Vec<String> =
                members.iter().filter_map(|row| language_of(row)).collect();
            languages.sort_unstable();
            languages.dedup();

            for &revision in &revisions {
                for language in &languages {
                    // The latest revision of this translation at or before R.
                    let paired = members
                        .iter()
                        .filter(|row| language_of(row).as_deref() == Some(language))
                        .filter_map(|row| revision_of(row).map(|rev| (rev, *row)))
                        .filter(|(rev, _)| *rev <= revision)
                        .max_by_key(|(rev, _)| *rev);

                    let Some((content_revision, content)) = paired else {
                        continue;
                    };

                    let mut emitted = content.clone();
                    emitted.insert(self.revision_field.clone(), Value::Int(revision));
                    emitted.insert(self.language_field.clone(), Value::from(language.clone()));
                    emitted.insert(self.entity_field.clone(), Value::Int(*set_id));
                    emitted.insert("content_revision".to_string(), Value::Int(content_revision));
                    output.push(emitted);
                }
            }
        }

        output.sort_by_key(|row| {
            (
                row.get(&self.revision_field).and_then(Value::as_i64),
                row.get(&self.language_field).and_then(Value::to_display_string),
            )
        });

        debug!(
            table = %self.table,
            emitted = output.len(),
            "reconstructed revision/translation pairs"
        );

        Ok(output)
    }
}

#[async_trait]
impl Source for RevisionTranslationSource {
    fn query(&self) -> SourceQuery {
        SourceQuery::new(self.table.clone())
            .order_by(self.revision_field.clone(), SortDirection::Ascending)
            .order_by(self.language_field.clone(), SortDirection::Ascending)
    }

    fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = self.fields.clone();
        fields
            .entry(self.entity_field.clone())
            .or_insert_with(|| "Entity id of the translation set".to_string());
        fields
            .entry(self.revision_field.clone())
            .or_insert_with(|| "Claimed revision".to_string());
        fields
            .entry(self.language_field.clone())
            .or_insert_with(|| "Translation language".to_string());
        fields
            .entry("content_revision".to_string())
            .or_insert_with(|| "Revision the content properties were read from".to_string());
        fields
    }

    fn ids(&self) -> Vec<IdFieldDefinition> {
        vec![
            IdFieldDefinition::integer(self.revision_field.clone()),
            IdFieldDefinition::string(self.language_field.clone()),
        ]
    }

    async fn open(&mut self) -> MigrateResult<()> {
        self.buffer = self.reconstruct()?.into();
        self.opened = true;

        Ok(())
    }

    async fn next(&mut self) -> MigrateResult<Option<Row>> {
        if !self.opened {
            bail!(
                ErrorKind::InvalidState,
                "Source must be opened before iteration"
            );
        }

        match self.buffer.pop_front() {
            Some(values) => Ok(Some(Row::new(values, &self.ids())?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revision_row(nid: i64, vid: i64, language: &str, tnid: i64) -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("nid".to_string(), Value::Int(nid)),
            ("vid".to_string(), Value::Int(vid)),
            ("language".to_string(), Value::from(language)),
            ("tnid".to_string(), Value::Int(tnid)),
            (
                "title".to_string(),
                Value::from(format!("{language} title v{vid}")),
            ),
        ])
    }

    fn source() -> RevisionTranslationSource {
        let dataset = Dataset::new().with_table(
            "node_revisions",
            vec![
                revision_row(1, 1, "en", 1),
                revision_row(2, 2, "fr", 1),
                revision_row(3, 3, "de", 1),
                revision_row(1, 4, "en", 1),
            ],
        );
        RevisionTranslationSource::new(dataset, "node_revisions", "nid", "vid", "language")
            .with_set_field("tnid")
    }

    async fn collect_pairs(mut source: RevisionTranslationSource) -> Vec<(i64, String, i64)> {
        source.open().await.unwrap();
        let mut pairs = Vec::new();
        while let Some(row) = source.next().await.unwrap() {
            pairs.push((
                row.get_source("vid").unwrap().as_i64().unwrap(),
                row.get_source("language").unwrap().as_str().unwrap().to_string(),
                row.get_source("content_revision").unwrap().as_i64().unwrap(),
            ));
        }
        pairs
    }

    #[tokio::test]
    async fn as_of_reconstruction_matches_worked_example() {
        let pairs = collect_pairs(source()).await;

        let expected = vec![
            (1, "en".to_string(), 1),
            (2, "en".to_string(), 1),
            (2, "fr".to_string(), 2),
            (3, "de".to_string(), 3),
            (3, "en".to_string(), 1),
            (3, "fr".to_string(), 2),
            (4, "de".to_string(), 3),
            (4, "en".to_string(), 4),
            (4, "fr".to_string(), 2),
        ];
        assert_eq!(pairs, expected);
    }

    #[tokio::test]
    async fn content_comes_from_the_paired_revision() {
        let mut source = source();
        source.open().await.unwrap();

        while let Some(row) = source.next().await.unwrap() {
            let vid = row.get_source("vid").unwrap().as_i64().unwrap();
            let language = row.get_source("language").unwrap().as_str().unwrap();
            if vid == 3 && language == "en" {
                // Revision 3's English pairing reads content from v1.
                assert_eq!(row.get_source("title"), Some(&Value::from("en title v1")));
                assert_eq!(row.get_source("nid"), Some(&Value::Int(1)));
                return;
            }
        }
        panic!("expected a (v3, en) row");
    }

    #[tokio::test]
    async fn singleton_entity_is_its_own_set() {
        let dataset = Dataset::new().with_table(
            "node_revisions",
            vec![revision_row(7, 10, "en", 0), revision_row(7, 11, "en", 0)],
        );
        let source =
            RevisionTranslationSource::new(dataset, "node_revisions", "nid", "vid", "language")
                .with_set_field("tnid");

        let pairs = collect_pairs(source).await;
        assert_eq!(
            pairs,
            vec![(10, "en".to_string(), 10), (11, "en".to_string(), 11)]
        );
    }
}
