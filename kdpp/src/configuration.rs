use anyhow::{Context, Result};
use kdpp_base::{
    algorithm::Algorithm,
    dataset::{Dataset, Datatype, Metadata},
    kernel::{Hyperparameters, Kernel, LeveragedSquaredExponential, SquaredExponential},
    types::{LeveragedVector, Point, Vector},
};
use kdpp_sequential::{ikdpp::IncrementalKDpp, random::RandomSubset, SequentialAlgorithm};
use log::info;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::path::PathBuf;

pub trait Sha {
    fn update_sha<D: Digest>(&self, sha: &mut D);

    fn sha(&self) -> Result<String> {
        let mut sha = sha2::Sha256::new();
        self.update_sha(&mut sha);
        Ok(format!("{:x}", sha.result()))
    }
}

impl<T: Sha> Sha for Vec<T> {
    fn update_sha<D: Digest>(&self, sha: &mut D) {
        for x in self.iter() {
            x.update_sha(sha);
        }
    }
}

impl<T: Sha> Sha for Option<T> {
    fn update_sha<D: Digest>(&self, sha: &mut D) {
        match self {
            Some(x) => {
                sha.input([1u8]);
                x.update_sha(sha);
            }
            None => sha.input([0u8]),
        }
    }
}

impl Sha for usize {
    fn update_sha<D: Digest>(&self, sha: &mut D) {
        sha.input(self.to_le_bytes());
    }
}

impl Sha for u64 {
    fn update_sha<D: Digest>(&self, sha: &mut D) {
        sha.input(self.to_le_bytes());
    }
}

impl Sha for f64 {
    fn update_sha<D: Digest>(&self, sha: &mut D) {
        sha.input(self.to_le_bytes());
    }
}

impl Sha for bool {
    fn update_sha<D: Digest>(&self, sha: &mut D) {
        sha.input([*self as u8]);
    }
}

impl Sha for String {
    fn update_sha<D: Digest>(&self, sha: &mut D) {
        sha.input(self.as_bytes());
    }
}

impl Sha for Hyperparameters {
    fn update_sha<D: Digest>(&self, sha: &mut D) {
        self.gain.update_sha(sha);
        self.lengthscale.update_sha(sha);
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum AlgorithmConfig {
    Random {
        seed: u64,
    },
    IncrementalKDpp {
        seed: u64,
        #[serde(default)]
        truncation: Option<usize>,
        #[serde(default)]
        parallel: bool,
    },
}

impl Sha for AlgorithmConfig {
    fn update_sha<D: Digest>(&self, sha: &mut D) {
        match &self {
            AlgorithmConfig::Random { seed } => {
                sha.input("random");
                seed.update_sha(sha);
            }
            AlgorithmConfig::IncrementalKDpp {
                seed,
                truncation,
                parallel,
            } => {
                sha.input("incremental-kdpp");
                seed.update_sha(sha);
                truncation.update_sha(sha);
                parallel.update_sha(sha);
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Configuration {
    pub subset_size: usize,
    pub algorithm: AlgorithmConfig,
    pub dataset: PathBuf,
    /// Similarity used by the selection and to score its outcome.
    #[serde(default)]
    pub kernel: Hyperparameters,
    /// Size of the global rayon thread pool, rayon's default if missing.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Where to store the results, `~/kdpp-results.sqlite` if missing.
    #[serde(default)]
    pub results_db: Option<PathBuf>,
}

impl Sha for Configuration {
    fn update_sha<D: Digest>(&self, sha: &mut D) {
        self.subset_size.update_sha(sha);
        self.algorithm.update_sha(sha);
        self.dataset.to_string_lossy().into_owned().update_sha(sha);
        self.kernel.update_sha(sha);
        self.threads.update_sha(sha);
    }
}

impl Configuration {
    /// Loads the configuration from `arg`, which is either the path to a
    /// JSON file or a JSON object encoded as base64.
    pub fn load(arg: String) -> anyhow::Result<Self> {
        let path = PathBuf::from(&arg);
        let config: Configuration = if path.is_file() {
            serde_json::from_reader(std::fs::File::open(path)?)
                .context("parsing configuration file")?
        } else {
            let decoded_str = String::from_utf8(base64::decode(arg)?)?;
            serde_json::from_str(&decoded_str).context("parsing configuration")?
        };

        if config.subset_size == 0 {
            anyhow::bail!("the subset size must be positive");
        }
        config.kernel.validate()?;

        Ok(config)
    }

    pub fn datatype(&self) -> anyhow::Result<Datatype> {
        info!("Reading datatype from {:?}", self.dataset);
        let meta = self.dataset_metadata().context("reading datatype")?;
        Ok(meta.datatype)
    }

    pub fn dataset_metadata(&self) -> anyhow::Result<Metadata> {
        Dataset::new(&self.dataset)
            .metadata()
            .context("reading metadata")
    }

    pub fn configure_threads(&self) -> anyhow::Result<()> {
        if let Some(threads) = self.threads {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .context("setting up the thread pool")?;
        }
        Ok(())
    }

    /// Name, version and parameters of the configured algorithm, without
    /// reading the dataset.
    pub fn algorithm_info(&self) -> Box<dyn Algorithm> {
        match &self.algorithm {
            AlgorithmConfig::Random { seed } => Box::new(RandomSubset::new(*seed)),
            AlgorithmConfig::IncrementalKDpp {
                seed,
                truncation,
                parallel,
            } => Box::new(IncrementalKDpp::new((), *truncation, *parallel, *seed)),
        }
    }
}

pub trait Configure: Point + Clone + Sync + 'static {
    type Kernel: Kernel<Self> + 'static;

    fn configure_kernel(conf: &Configuration) -> Result<Self::Kernel>;

    fn configure_sequential_algorithm(
        conf: &Configuration,
    ) -> Result<Box<dyn SequentialAlgorithm<Self>>> {
        let algorithm: Box<dyn SequentialAlgorithm<Self>> = match &conf.algorithm {
            AlgorithmConfig::Random { seed } => Box::new(RandomSubset::new(*seed)),
            AlgorithmConfig::IncrementalKDpp {
                seed,
                truncation,
                parallel,
            } => Box::new(IncrementalKDpp::new(
                Self::configure_kernel(conf)?,
                *truncation,
                *parallel,
                *seed,
            )),
        };
        Ok(algorithm)
    }
}

impl Configure for Vector {
    type Kernel = SquaredExponential;

    fn configure_kernel(conf: &Configuration) -> Result<Self::Kernel> {
        Ok(SquaredExponential::new(conf.kernel)?)
    }
}

impl Configure for LeveragedVector {
    type Kernel = LeveragedSquaredExponential;

    fn configure_kernel(conf: &Configuration) -> Result<Self::Kernel> {
        Ok(LeveragedSquaredExponential::new(conf.kernel)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const JSON: &str = r#"{
        "subset_size": 10,
        "algorithm": { "IncrementalKDpp": { "seed": 3, "truncation": 100 } },
        "dataset": "/tmp/points.msgpack.gz",
        "kernel": { "gain": 1.0, "lengthscale": 0.5 }
    }"#;

    #[test]
    fn load_base64() {
        let config = Configuration::load(base64::encode(JSON)).unwrap();
        assert_eq!(config.subset_size, 10);
        assert_eq!(
            config.algorithm,
            AlgorithmConfig::IncrementalKDpp {
                seed: 3,
                truncation: Some(100),
                parallel: false
            }
        );
        assert_eq!(config.kernel, Hyperparameters::new(1.0, 0.5).unwrap());
        assert_eq!(config.threads, None);

        let info = config.algorithm_info();
        assert_eq!(info.name(), "IncrementalKDpp");
        assert_eq!(
            info.parameters(),
            r#"{ "seed": 3, "truncation": 100, "parallel": false }"#
        );
    }

    #[test]
    fn load_rejects_invalid() {
        let zero = JSON.replace("\"subset_size\": 10", "\"subset_size\": 0");
        assert!(Configuration::load(base64::encode(zero)).is_err());
        let gain = JSON.replace("\"gain\": 1.0", "\"gain\": -1.0");
        assert!(Configuration::load(base64::encode(gain)).is_err());
    }

    #[test]
    fn sha_identifies_experiments() {
        let config = Configuration::load(base64::encode(JSON)).unwrap();
        let same = Configuration {
            results_db: Some(PathBuf::from("/tmp/other.sqlite")),
            ..config.clone()
        };
        assert_eq!(config.sha().unwrap(), same.sha().unwrap());

        let other_seed = Configuration {
            algorithm: AlgorithmConfig::IncrementalKDpp {
                seed: 4,
                truncation: Some(100),
                parallel: false,
            },
            ..config.clone()
        };
        assert_ne!(config.sha().unwrap(), other_seed.sha().unwrap());

        let other_kernel = Configuration {
            kernel: Hyperparameters::default(),
            ..config.clone()
        };
        assert_ne!(config.sha().unwrap(), other_kernel.sha().unwrap());
    }
}
