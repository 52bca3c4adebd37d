use crate::configuration::*;
use anyhow::{Context, Result};
use chrono::prelude::*;
use log::info;
use rusqlite::*;
use std::path::PathBuf;
use std::time::Duration;

const CODE_VERSION: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

struct Outcome {
    pub total_time: Duration,
    pub log_det: Option<f64>,
    pub num_selected: u32,
}

struct Counters {
    pub kernel: u64,
    pub update: u64,
}

pub struct Reporter {
    db_path: PathBuf,
    date: DateTime<Utc>,
    config: Configuration,
    outcome: Option<Outcome>,
    counters: Option<Counters>,
    profile: Option<(Duration, Duration)>,
}

impl Reporter {
    pub fn from_config(config: Configuration) -> Result<Self> {
        let db_path = match config.results_db.as_ref() {
            Some(path) => path.clone(),
            None => Self::default_db_path()?,
        };
        info!("reporting results to {:?}", db_path);
        Ok(Self {
            db_path,
            date: Utc::now(),
            config,
            outcome: None,
            profile: None,
            counters: None,
        })
    }

    fn default_db_path() -> Result<PathBuf> {
        #[allow(deprecated)]
        let mut path = std::env::home_dir().context("unable to get home directory")?;
        path.push("kdpp-results.sqlite");
        Ok(path)
    }

    pub fn set_outcome(&mut self, total_time: Duration, log_det: Option<f64>, num_selected: u32) {
        self.outcome.replace(Outcome {
            total_time,
            log_det,
            num_selected,
        });
    }

    pub fn set_counters(&mut self, (kernel, update): (u64, u64)) {
        self.counters.replace(Counters { kernel, update });
    }

    pub fn set_profile(&mut self, profile: (Duration, Duration)) {
        self.profile.replace(profile);
    }

    fn get_conn(&self) -> Result<Connection> {
        let dbpath = &self.db_path;
        let conn = Connection::open(dbpath).context("error connecting to the database")?;
        db_migrate(&conn).context("error running migrations")?;
        if !dbpath.is_file() {
            anyhow::bail!("migration did not setup database {:?}", dbpath);
        }
        Ok(conn)
    }

    pub fn already_run(&self) -> Result<Option<i64>> {
        let algo = self.config.algorithm_info();
        let conn = self
            .get_conn()
            .context("error connecting to the database")?;
        conn.query_row(
            "SELECT id FROM result WHERE params_sha = ?1 AND algorithm = ?2 AND algorithm_version = ?3",
            params![self.config.sha()?, algo.name(), algo.version()],
            |row| row.get(0),
        )
        .optional()
        .context("error running query")
    }

    pub fn save(self) -> Result<()> {
        let mut conn = self.get_conn()?;
        let algo = self.config.algorithm_info();

        let metadata = self.config.dataset_metadata()?;
        let dataset = &metadata.name;
        let dataset_version = metadata.version;
        let dataset_params = metadata.parameters_string();

        let outcome = self.outcome.context("no outcome registered")?;
        let counters = self.counters.context("missing counters")?;
        let (setup_time, selection_time) = self.profile.context("missing time profile")?;

        let tx = conn.transaction()?;
        tx.execute_named(
            "INSERT INTO result_raw (
                code_version, date, threads, params_sha,
                algorithm, algorithm_params, algorithm_version,
                kernel_params,
                dataset, dataset_params, dataset_version,
                subset_size,
                total_time_ms,
                setup_time_ms,
                selection_time_ms,
                kernel_cnt,
                update_cnt,
                log_det,
                num_selected
            ) VALUES (
                :code_version, :date, :threads, :params_sha,
                :algorithm, :algorithm_params, :algorithm_version,
                :kernel_params,
                :dataset, :dataset_params, :dataset_version,
                :subset_size,
                :total_time_ms,
                :setup_time_ms,
                :selection_time_ms,
                :kernel_cnt,
                :update_cnt,
                :log_det,
                :num_selected
            )",
            named_params! {
                ":code_version": CODE_VERSION,
                ":date": self.date.to_rfc3339(),
                ":threads": self.config.threads.map(|t| t as u32),
                ":params_sha": self.config.sha()?,
                ":algorithm": algo.name(),
                ":algorithm_params": algo.parameters(),
                ":algorithm_version": algo.version(),
                ":kernel_params": serde_json::to_string(&self.config.kernel)?,
                ":dataset": dataset,
                ":dataset_params": dataset_params,
                ":dataset_version": dataset_version,
                ":subset_size": self.config.subset_size as i64,
                ":total_time_ms": outcome.total_time.as_millis() as i64,
                ":setup_time_ms": setup_time.as_millis() as i64,
                ":selection_time_ms": selection_time.as_millis() as i64,
                ":kernel_cnt": counters.kernel as i64,
                ":update_cnt": counters.update as i64,
                ":log_det": outcome.log_det,
                ":num_selected": outcome.num_selected,
            },
        )?;

        tx.commit()?;

        conn.close().map_err(|e| e.1).context("closing database")
    }
}

fn db_migrate(conn: &Connection) -> Result<()> {
    let version: u32 = conn
        .query_row(
            "SELECT user_version FROM pragma_user_version",
            params![],
            |row| row.get(0),
        )
        .context("cannot get version of the database")?;

    if version < 1 {
        conn.execute_batch(include_str!("migrations/v1.sql"))
            .context("error applying version 1")?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use kdpp_base::dataset::{Dataset, Datatype, Metadata};
    use kdpp_base::kernel::Hyperparameters;
    use kdpp_base::types::Vector;
    use std::collections::BTreeMap;

    fn scratch(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "kdpp-reporter-{}-{}",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn save_then_skip() {
        let dataset = scratch("points.msgpack.gz");
        let meta = Metadata {
            version: 1,
            name: String::from("line"),
            datatype: Datatype::Vector,
            parameters: BTreeMap::new(),
        };
        let points: Vec<Vector> = (0..4).map(|i| Vector::new(vec![i as f64])).collect();
        Dataset::new(&dataset).write(&meta, &points, None).unwrap();

        let config = Configuration {
            subset_size: 2,
            algorithm: AlgorithmConfig::Random { seed: 1 },
            dataset,
            kernel: Hyperparameters::default(),
            threads: None,
            results_db: Some(scratch("results.sqlite")),
        };

        let reporter = Reporter::from_config(config.clone()).unwrap();
        assert_eq!(reporter.already_run().unwrap(), None);

        let mut reporter = Reporter::from_config(config.clone()).unwrap();
        reporter.set_outcome(Duration::from_millis(5), Some(-0.5), 2);
        reporter.set_profile((Duration::from_millis(0), Duration::from_millis(4)));
        reporter.set_counters((3, 1));
        reporter.save().unwrap();

        let reporter = Reporter::from_config(config.clone()).unwrap();
        assert!(reporter.already_run().unwrap().is_some());

        let other = Configuration {
            algorithm: AlgorithmConfig::Random { seed: 2 },
            ..config
        };
        let reporter = Reporter::from_config(other).unwrap();
        assert_eq!(reporter.already_run().unwrap(), None);
    }

    #[test]
    fn save_requires_outcome() {
        let config = Configuration {
            subset_size: 2,
            algorithm: AlgorithmConfig::Random { seed: 1 },
            dataset: scratch("missing.msgpack.gz"),
            kernel: Hyperparameters::default(),
            threads: None,
            results_db: Some(scratch("no-outcome.sqlite")),
        };
        let reporter = Reporter::from_config(config).unwrap();
        assert!(reporter.save().is_err());
    }
}
