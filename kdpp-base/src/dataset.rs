use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::{collections::BTreeMap, io::BufReader, io::BufWriter};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Integer(u32),
    Float(f64),
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    #[serde(rename = "vector")]
    Vector,
    #[serde(rename = "leveraged-vector")]
    LeveragedVector,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Metadata {
    pub version: u32,
    pub name: String,
    pub datatype: Datatype,
    pub parameters: BTreeMap<String, MetadataValue>,
}

impl Metadata {
    pub fn parameters_string(&self) -> String {
        let v: Vec<String> = self
            .parameters
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        v.join(" ")
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
struct Item<T> {
    point: T,
    #[serde(default)]
    quality: Option<f64>,
}

/// The candidate pool stored in a dataset file, along with the optional
/// quality of each point.
#[derive(Debug, Clone)]
pub struct Pool<T> {
    pub points: Vec<T>,
    pub quality: Option<Vec<f64>>,
}

impl<T> Pool<T> {
    pub fn quality(&self) -> Option<&[f64]> {
        self.quality.as_deref()
    }
}

/// A gzip-compressed MessagePack file holding a [`Metadata`] record
/// followed by the list of items.
#[derive(Deserialize, Debug)]
pub struct Dataset {
    path: PathBuf,
}

impl Dataset {
    pub fn new<I: Into<PathBuf>>(path: I) -> Self {
        Self { path: path.into() }
    }

    pub fn metadata(&self) -> Result<Metadata> {
        let file = BufReader::new(
            std::fs::File::open(&self.path)
                .with_context(|| format!("opening dataset {:?}", self.path))?,
        );
        let input = GzDecoder::new(file);
        rmp_serde::from_read(input).context("reading metadata")
    }

    pub fn to_vec<T>(&self) -> Result<Pool<T>>
    where
        for<'de> T: Deserialize<'de>,
    {
        let file = BufReader::new(
            std::fs::File::open(&self.path)
                .with_context(|| format!("opening dataset {:?}", self.path))?,
        );
        let mut input = GzDecoder::new(file);
        let meta: Metadata = rmp_serde::from_read(&mut input).context("reading metadata")?;
        let items: Vec<Item<T>> = rmp_serde::from_read(&mut input).context("reading items")?;
        info!("read {} items of dataset {}", items.len(), meta.name);

        let with_quality = items.iter().filter(|item| item.quality.is_some()).count();
        if with_quality != 0 && with_quality != items.len() {
            anyhow::bail!(
                "only {} out of {} items have a quality",
                with_quality,
                items.len()
            );
        }

        let mut pl = progress_logger::ProgressLogger::builder().start();
        let mut points = Vec::with_capacity(items.len());
        let mut quality = Vec::with_capacity(with_quality);
        for item in items {
            points.push(item.point);
            if let Some(q) = item.quality {
                quality.push(q);
            }
            pl.update_light(1u64);
        }
        pl.stop();

        Ok(Pool {
            points,
            quality: if with_quality > 0 { Some(quality) } else { None },
        })
    }

    pub fn write<T: Serialize>(
        &self,
        meta: &Metadata,
        points: &[T],
        quality: Option<&[f64]>,
    ) -> Result<()> {
        if let Some(q) = quality {
            if q.len() != points.len() {
                anyhow::bail!("{} quality values for {} points", q.len(), points.len());
            }
        }
        let file = BufWriter::new(
            std::fs::File::create(&self.path)
                .with_context(|| format!("creating dataset {:?}", self.path))?,
        );
        let mut output = GzEncoder::new(file, Compression::default());
        let items: Vec<Item<&T>> = points
            .iter()
            .enumerate()
            .map(|(i, point)| Item {
                point,
                quality: quality.map(|q| q[i]),
            })
            .collect();
        rmp_serde::encode::write_named(&mut output, meta).context("writing metadata")?;
        rmp_serde::encode::write_named(&mut output, &items).context("writing items")?;
        output.finish().context("closing dataset")?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Vector;

    #[test]
    fn read_back_pool() {
        let path = std::env::temp_dir().join(format!("kdpp-dataset-{}.msgpack.gz", std::process::id()));
        let dataset = Dataset::new(&path);
        let mut parameters = BTreeMap::new();
        parameters.insert("n".to_owned(), MetadataValue::Integer(3));
        parameters.insert("source".to_owned(), MetadataValue::String("grid".to_owned()));
        let meta = Metadata {
            version: 1,
            name: "tiny".to_owned(),
            datatype: Datatype::Vector,
            parameters,
        };
        let points = vec![
            Vector::new(vec![0.0, 1.0]),
            Vector::new(vec![2.0, 3.0]),
            Vector::new(vec![4.0, 5.0]),
        ];
        dataset
            .write(&meta, &points, Some(&[0.5, 0.0, 1.0]))
            .unwrap();

        assert_eq!(dataset.metadata().unwrap(), meta);
        assert_eq!(meta.parameters_string(), "n=3 source=grid");
        let pool: Pool<Vector> = dataset.to_vec().unwrap();
        assert_eq!(pool.points, points);
        assert_eq!(pool.quality(), Some(&[0.5, 0.0, 1.0][..]));

        std::fs::remove_file(&path).unwrap();
    }
}
