//! Synthetic task spreadsheets for seeding a knowledge base.

use super::{LoaderError, XLSX_CONTENT_TYPE};
use crate::{
    estimate::estimated_price,
    rates::RateTable,
    spreadsheet,
    storage::ObjectStore,
    vocabulary::{Priority, VOCABULARY},
};
use rand::{Rng, seq::SliceRandom};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::{OffsetDateTime, macros::format_description};

/// Column order of generated workbooks.
pub const FAKE_HEADERS: [&str; 13] = [
    "MSCW",
    "Area",
    "Module",
    "Feature",
    "Task",
    "Profile",
    "MinDays",
    "RealDays",
    "MaxDays",
    "Contingency",
    "EstimatedDays",
    "EstimatedPrice",
    "potential_issues",
];

/// Sheet written by the generator.
pub const FAKE_SHEET: &str = "Sheet1";

/// Issues drawn for generated tasks.
pub const POTENTIAL_ISSUES: [&str; 8] = [
    "Scope creep",
    "Integration issues with Azure",
    "Cross-browser compatibility issues",
    "Usability challenges",
    "API security vulnerabilities",
    "Performance issues",
    "Security vulnerabilities",
    "Calendar integration errors",
];

const ISSUES_PER_TASK: usize = 2;

/// How often each issue has been drawn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueTally(BTreeMap<&'static str, usize>);

impl IssueTally {
    /// Empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, issue: &'static str) {
        *self.0.entry(issue).or_default() += 1;
    }

    /// Times `issue` was drawn.
    pub fn count(&self, issue: &str) -> usize {
        self.0.get(issue).copied().unwrap_or(0)
    }

    /// Total draws across all issues.
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Issues with their counts, alphabetically.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.0.iter().map(|(issue, count)| (*issue, *count))
    }
}

/// Draws plausible task rows from the shared vocabulary.
pub struct FakeDataGenerator<R: Rng> {
    rng: R,
    profiles: Vec<(String, f64)>,
}

impl<R: Rng> FakeDataGenerator<R> {
    /// Generator over `rates`; an empty table falls back to [`RateTable::sample`].
    pub fn new(rng: R, rates: &RateTable) -> Self {
        let rates = if rates.is_empty() {
            RateTable::sample()
        } else {
            rates.clone()
        };
        let profiles = rates
            .roles()
            .filter_map(|role| rates.rate_for(role).map(|rate| (role.to_string(), rate)))
            .collect();
        Self { rng, profiles }
    }

    fn pick(&mut self, values: &[&'static str]) -> &'static str {
        values.choose(&mut self.rng).copied().unwrap_or_default()
    }

    /// One task row keyed by [`FAKE_HEADERS`].
    pub fn record(&mut self, tally: &mut IssueTally) -> Map<String, Value> {
        let mscw = self.pick(&Priority::ALL.map(Priority::label));
        let area = self.pick(VOCABULARY.areas);
        let module = self.pick(VOCABULARY.modules);
        let feature = self.pick(VOCABULARY.features);

        let headcount: i64 = self.rng.gen_range(1..=4);
        let (role, rate) = self
            .profiles
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| ("Blended FE dev".to_string(), 200.0));

        let min_days = self.rng.gen_range(3..=7) * headcount;
        let real_days = self.rng.gen_range(min_days + 1..=min_days + 3);
        let max_days = self.rng.gen_range(real_days + 1..=real_days + 4);
        let estimated_days = real_days + 2;
        let price = estimated_price(estimated_days as f64, rate);

        let issues: Vec<&'static str> = POTENTIAL_ISSUES
            .choose_multiple(&mut self.rng, ISSUES_PER_TASK)
            .copied()
            .collect();
        for &issue in &issues {
            tally.record(issue);
        }

        let row = json!({
            "MSCW": mscw,
            "Area": area,
            "Module": module,
            "Feature": feature,
            "Task": format!("Task: {feature} for {module}"),
            "Profile": format!("{headcount} {role}"),
            "MinDays": min_days,
            "RealDays": real_days,
            "MaxDays": max_days,
            "Contingency": "0%",
            "EstimatedDays": estimated_days,
            "EstimatedPrice": price,
            "potential_issues": issues.join(", "),
        });
        match row {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// `count` rows.
    pub fn dataset(&mut self, count: usize, tally: &mut IssueTally) -> Vec<Map<String, Value>> {
        (0..count).map(|_| self.record(tally)).collect()
    }

    /// Encode `count` fresh rows as a workbook.
    pub fn workbook(&mut self, count: usize, tally: &mut IssueTally) -> Result<Vec<u8>, LoaderError> {
        let rows = self.dataset(count, tally);
        Ok(spreadsheet::write_rows(FAKE_SHEET, &FAKE_HEADERS, &rows)?)
    }

    /// Write `files` workbooks of `records` rows each into `dir`.
    ///
    /// Files are named `fake_project_{timestamp}_{n}.xlsx`; each optionally goes to
    /// `upload` under the same name.
    pub async fn write_files(
        &mut self,
        files: usize,
        records: usize,
        dir: &Path,
        upload: Option<&dyn ObjectStore>,
        tally: &mut IssueTally,
    ) -> Result<Vec<PathBuf>, LoaderError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| LoaderError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        let stamp = OffsetDateTime::now_utc()
            .format(format_description!("[year][month][day]_[hour][minute][second]"))
            .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string());

        let mut written = Vec::with_capacity(files);
        for index in 1..=files {
            let name = format!("fake_project_{stamp}_{index}.xlsx");
            let path = dir.join(&name);
            let bytes = self.workbook(records, tally)?;
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|source| LoaderError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!(path = %path.display(), records, "Fake project written");
            if let Some(store) = upload {
                store.upload(&name, bytes, XLSX_CONTENT_TYPE).await?;
            }
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_base::{SHEET_CANDIDATES, document_from_row};
    use crate::storage::LocalDirStore;
    use rand::{SeedableRng, rngs::StdRng};

    fn generator(seed: u64) -> FakeDataGenerator<StdRng> {
        FakeDataGenerator::new(StdRng::seed_from_u64(seed), &RateTable::sample())
    }

    #[test]
    fn records_respect_day_ranges_and_vocabulary() {
        let mut generator = generator(7);
        let mut tally = IssueTally::new();
        let rates = RateTable::sample();

        for row in generator.dataset(50, &mut tally) {
            let doc = document_from_row(1, &row);
            let (headcount, role) = doc.profile.split_once(' ').expect("profile");
            let headcount: i64 = headcount.parse().expect("headcount");
            assert!((1..=4).contains(&headcount));
            let rate = rates.rate_for(role).expect("known role");

            assert!(doc.min_days >= 3 * headcount && doc.min_days <= 7 * headcount);
            assert!(doc.real_days > doc.min_days && doc.real_days <= doc.min_days + 3);
            assert!(doc.max_days > doc.real_days && doc.max_days <= doc.real_days + 4);
            assert_eq!(doc.estimated_days, doc.real_days + 2);
            assert_eq!(doc.estimated_price, doc.estimated_days as f64 * rate);
            assert_eq!(doc.contingency, "0%");
            assert!(Priority::parse(&doc.mscw).is_some());
            assert!(VOCABULARY.areas.contains(&doc.area.as_str()));
            assert_eq!(doc.task, format!("Task: {} for {}", doc.feature, doc.module));

            let issues: Vec<&str> = doc.potential_issues.split(", ").collect();
            assert_eq!(issues.len(), 2);
            assert_ne!(issues[0], issues[1]);
        }
        assert_eq!(tally.total(), 100);
    }

    #[test]
    fn tally_is_threaded_through_calls() {
        let mut generator = generator(11);
        let mut tally = IssueTally::new();
        generator.dataset(3, &mut tally);
        generator.dataset(2, &mut tally);
        assert_eq!(tally.total(), 10);
        assert_eq!(
            tally.iter().map(|(_, count)| count).sum::<usize>(),
            tally.total()
        );
        assert!(tally.iter().all(|(issue, _)| POTENTIAL_ISSUES.contains(&issue)));
    }

    #[test]
    fn same_seed_same_rows() {
        let mut first = IssueTally::new();
        let mut second = IssueTally::new();
        assert_eq!(
            generator(3).dataset(5, &mut first),
            generator(3).dataset(5, &mut second)
        );
        assert_eq!(first, second);
    }

    #[test]
    fn empty_rate_table_uses_sample_profiles() {
        let mut generator = FakeDataGenerator::new(StdRng::seed_from_u64(1), &RateTable::default());
        let row = generator.record(&mut IssueTally::new());
        let profile = row["Profile"].as_str().expect("profile");
        let role = profile.split_once(' ').expect("headcount").1;
        assert!(RateTable::sample().rate_for(role).is_some());
    }

    #[tokio::test]
    async fn files_are_readable_and_uploaded() {
        let out = tempfile::tempdir().expect("out");
        let blobs = tempfile::tempdir().expect("blobs");
        let store = LocalDirStore::new(blobs.path());
        let mut tally = IssueTally::new();

        let paths = generator(5)
            .write_files(2, 4, out.path(), Some(&store as &dyn ObjectStore), &mut tally)
            .await
            .expect("write");

        assert_eq!(paths.len(), 2);
        for path in &paths {
            let name = path.file_name().and_then(|n| n.to_str()).expect("name");
            assert!(name.starts_with("fake_project_") && name.ends_with(".xlsx"));
            let bytes = std::fs::read(path).expect("read");
            let sheet = spreadsheet::read_first_matching_sheet(&bytes, &SHEET_CANDIDATES)
                .expect("parse")
                .expect("sheet");
            assert_eq!(sheet.name, FAKE_SHEET);
            assert_eq!(sheet.rows.len(), 4);
        }
        assert_eq!(store.list().await.expect("list").len(), 2);
        assert_eq!(tally.total(), 16);
    }
}
