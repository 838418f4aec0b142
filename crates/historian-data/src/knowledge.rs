//! Text-to-SQL training data: table DDL, documentation, and question/SQL pairs.
//!
//! The historian table and its curated examples are built in. Additional
//! datasets are JSON files (`{"ddl": [...], "documentation": [...],
//! "examples": [{"question", "sql"}]}`) loaded from a directory.

use std::collections::HashSet;
use std::path::Path;

use historian_core::config::KnowledgeConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub question: String,
    pub sql: String,
}

impl TrainingExample {
    pub fn new(question: &str, sql: &str) -> Self {
        Self {
            question: question.to_string(),
            sql: sql.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub ddl: Vec<String>,
    #[serde(default)]
    pub documentation: Vec<String>,
    #[serde(default)]
    pub examples: Vec<TrainingExample>,
}

const HISTORIAN_DDL: &str = r#"CREATE TABLE IF NOT EXISTS public.historian
(
    "tagname" text,
    "datetime" text,
    "value" double precision,
    "vvalue" double precision,
    "minraw" double precision,
    "maxraw" double precision,
    "mineu" double precision,
    "maxeu" double precision,
    "unit" text,
    "quality" boolean,
    "qualitydetail" bigint,
    "qualitystring" text,
    "wwresolution" bigint,
    "startdatetime" timestamp without time zone
)"#;

const HISTORIAN_DOCS: &[&str] = &[
    "public.historian stores one row per tag sample. Use \"startdatetime\" (timestamp) for time filters and ordering; \"datetime\" is the same instant as text.",
    "Tag names are prefixed by their area, e.g. 'Cluster1.LOOP_2_SP'. Control loops expose a setpoint tag ending in _SP and a process value tag ending in _PV.",
    "Tags containing TotkWh accumulate energy in kWh. Tags containing TotW1S are instantaneous power readings. 'Cluster1.Tariff' is the electricity tariff.",
    "Match equipment with ILIKE patterns on \"tagname\" (for example '%Mixer%TotkWh%'), since tag names embed the equipment name.",
];

const HISTORIAN_EXAMPLES: &[(&str, &str)] = &[
    (
        "Compare LOOP_2_SP vs LOOP_2_PV for the past 30 minutes.",
        r#"SELECT "startdatetime", "tagname", "value" FROM public.historian WHERE "tagname" IN ('Cluster1.LOOP_2_SP','Cluster1.LOOP_2_PV') AND "startdatetime" > now() - interval '30 minutes' ORDER BY "startdatetime";"#,
    ),
    (
        "What is the total kWh consumed by mixers vs pumps this month?",
        r#"SELECT CASE WHEN "tagname" ILIKE '%Mixer%' THEN 'Mixer' ELSE 'Pump' END AS equipment_type, SUM("value") AS total_kWh FROM public.historian WHERE ("tagname" ILIKE '%Mixer%TotkWh%' OR "tagname" ILIKE '%Pump%TotkWh%') AND "startdatetime" >= date_trunc('month', current_date) GROUP BY equipment_type;"#,
    ),
    (
        "What is the entry speed and accumulator length for today's shift?",
        r#"SELECT "tagname", AVG("value") AS avg_val FROM public.historian WHERE "tagname" IN ('Cluster1.EntrySpeed','Cluster1.EntryAccumulatorLength') AND "startdatetime" > date_trunc('day', now()) GROUP BY "tagname";"#,
    ),
    (
        "Was the agitator in Tank 1 overloaded yesterday?",
        r#"SELECT MAX("value") AS max_power FROM public.historian WHERE "tagname" ILIKE '%Bottler_Tank1_Agitator%TotW1S%' AND "startdatetime"::date = current_date - interval '1 day';"#,
    ),
    (
        "Did Line 1 meet its setpoint speed yesterday?",
        r#"SELECT AVG(CASE WHEN "tagname"='Cluster1.LOOP_3_SP' THEN "value" END) AS avg_sp, AVG(CASE WHEN "tagname"='Cluster1.LOOP_3_PV' THEN "value" END) AS avg_pv FROM public.historian WHERE ("tagname"='Cluster1.LOOP_3_SP' OR "tagname"='Cluster1.LOOP_3_PV') AND "startdatetime"::date = current_date - interval '1 day';"#,
    ),
    (
        "How much did energy tariffs cost for Cluster1 today?",
        r#"SELECT SUM("value") AS tariff_cost FROM public.historian WHERE "tagname"='Cluster1.Tariff' AND "startdatetime"::date = current_date;"#,
    ),
    (
        "Forecast total energy cost for this week.",
        r#"SELECT SUM("value") AS forecast_kWh FROM public.historian WHERE "tagname" ILIKE '%TotkWh%' AND "startdatetime" > date_trunc('week', current_date);"#,
    ),
    (
        "Suggest best schedule to minimize electricity tariff cost.",
        r#"SELECT EXTRACT(HOUR FROM "startdatetime") AS hour, AVG("value") AS avg_tariff FROM public.historian WHERE "tagname"='Cluster1.Tariff' AND "startdatetime" > now() - interval '7 days' GROUP BY hour ORDER BY avg_tariff;"#,
    ),
    (
        "Show me the real kWh usage of Line 1 pasteurizer in the last 8 hours.",
        r#"SELECT "startdatetime", "value" FROM public.historian WHERE "tagname" ILIKE '%PLT_LINE1%TotkWh%' AND "startdatetime" > now() - interval '8 hours' ORDER BY "startdatetime";"#,
    ),
    (
        "What is the current power consumption of Raw Skim Milk Out Pump?",
        r#"SELECT "startdatetime", "value" FROM public.historian WHERE "tagname" ILIKE '%Raw_SkimMilkOutPump%TotW1S%' ORDER BY "startdatetime" DESC LIMIT 1;"#,
    ),
    (
        "How much power is the Mixer_RawMilk consuming at this moment?",
        r#"SELECT "startdatetime", "value" FROM public.historian WHERE "tagname" ILIKE '%Mixer_RawMilk%TotW1S%' ORDER BY "startdatetime" DESC LIMIT 1;"#,
    ),
];

impl KnowledgeBase {
    /// Built-in historian schema, documentation and examples.
    pub fn historian() -> Self {
        Self {
            ddl: vec![HISTORIAN_DDL.to_string()],
            documentation: HISTORIAN_DOCS.iter().map(|d| d.to_string()).collect(),
            examples: HISTORIAN_EXAMPLES
                .iter()
                .map(|(q, s)| TrainingExample::new(q, s))
                .collect(),
        }
    }

    /// Built-in data plus `training_dir` when configured.
    pub fn from_config(cfg: &KnowledgeConfig) -> Self {
        let mut kb = Self::historian();
        if let Some(ref dir) = cfg.training_dir {
            let loaded = kb.load_dir(dir);
            tracing::info!("Loaded {} training file(s) from {}", loaded, dir.display());
        }
        kb
    }

    pub fn merge(&mut self, other: KnowledgeBase) {
        self.ddl.extend(other.ddl);
        self.documentation.extend(other.documentation);
        self.examples.extend(other.examples);
    }

    /// Merge every `*.json` file in `dir` (sorted by name). Returns how many loaded.
    pub fn load_dir(&mut self, dir: &Path) -> usize {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Cannot read training dir {}: {}", dir.display(), e);
                return 0;
            }
        };
        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str::<KnowledgeBase>(&s).map_err(|e| e.to_string()));
            match parsed {
                Ok(kb) => {
                    tracing::debug!(
                        "Training file {}: {} ddl, {} docs, {} examples",
                        path.display(),
                        kb.ddl.len(),
                        kb.documentation.len(),
                        kb.examples.len()
                    );
                    self.merge(kb);
                    loaded += 1;
                }
                Err(e) => tracing::warn!("Skipping training file {}: {}", path.display(), e),
            }
        }
        loaded
    }

    /// Top `k` examples by token overlap with `question`. Ties keep insertion order.
    pub fn similar_examples(&self, question: &str, k: usize) -> Vec<&TrainingExample> {
        let q = tokens(question);
        let mut scored: Vec<(f64, &TrainingExample)> = self
            .examples
            .iter()
            .map(|ex| (jaccard(&q, &tokens(&ex.question)), ex))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, ex)| ex).collect()
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_historian_data() {
        let kb = KnowledgeBase::historian();
        assert!(kb.ddl[0].contains("public.historian"));
        assert!(kb.ddl[0].contains("\"startdatetime\" timestamp"));
        assert_eq!(kb.examples.len(), HISTORIAN_EXAMPLES.len());
        for ex in &kb.examples {
            assert!(
                crate::sql::validate_read_only(&ex.sql).is_ok(),
                "example must pass the guard: {}",
                ex.question
            );
        }
    }

    #[test]
    fn test_similar_examples_ranks_by_overlap() {
        let kb = KnowledgeBase::historian();
        let top = kb.similar_examples("compare LOOP_2_SP and LOOP_2_PV over the past hour", 2);
        assert_eq!(top[0].question, "Compare LOOP_2_SP vs LOOP_2_PV for the past 30 minutes.");
        assert!(kb.similar_examples("zzz qqq", 3).is_empty());
    }

    #[test]
    fn test_load_dir_merges_and_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"ddl": ["CREATE TABLE public.power (sites text)"],
                "examples": [{"question": "Total energy for site-1?", "sql": "SELECT 1;"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("b.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut kb = KnowledgeBase::historian();
        let before = kb.examples.len();
        assert_eq!(kb.load_dir(dir.path()), 1);
        assert_eq!(kb.ddl.len(), 2);
        assert_eq!(kb.examples.len(), before + 1);
    }

    #[test]
    fn test_load_dir_missing_is_zero() {
        let mut kb = KnowledgeBase::default();
        assert_eq!(kb.load_dir(Path::new("/definitely/not/here")), 0);
    }

    #[test]
    fn test_bundled_power_training_file_parses() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../training");
        let mut kb = KnowledgeBase::default();
        assert_eq!(kb.load_dir(&dir), 1);
        assert!(kb.ddl[0].contains("public.power"));
        assert!(!kb.examples.is_empty());
    }
}
