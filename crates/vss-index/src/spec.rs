//! Build-spec strings and the capabilities they grant
//!
//! A build spec names the stages backing a column, comma separated:
//!
//! | spec                  | meaning                                        |
//! |-----------------------|------------------------------------------------|
//! | `Flat`                | exact scan, positional ids only                |
//! | `Flat,IDMap`          | exact scan keyed by row id                     |
//! | `Flat,IDMap2`         | as above, plus vector reconstruction           |
//! | `IVF16,Flat`          | 16 k-means partitions, needs training          |
//! | `IVF16,Flat,IDMap2`   | partitioned, keyed, reconstructable            |
//! | `L2norm,Flat,IDMap2`  | vectors normalized to unit length first        |
//!
//! The id-map stage may also lead (`IDMap2,Flat`).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use vss_core::VssError;

bitflags! {
    /// Operations a parsed build spec supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Capabilities: u8 {
        const ADD_WITH_IDS = 1 << 0;
        const REMOVE_IDS = 1 << 1;
        const RECONSTRUCT = 1 << 2;
        const REQUIRES_TRAINING = 1 << 3;
        const NORMALIZE = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseStage {
    Flat,
    /// Inverted file with `nlist` partitions
    Ivf { nlist: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdMapStage {
    /// Ids are whatever position the backend assigns
    None,
    /// External ids, no reconstruction
    IdMap,
    /// External ids with reconstruction
    IdMap2,
}

/// A parsed build spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub base: BaseStage,
    pub id_map: IdMapStage,
    pub normalize: bool,
}

impl IndexSpec {
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        if let BaseStage::Ivf { .. } = self.base {
            caps |= Capabilities::REQUIRES_TRAINING
                | Capabilities::ADD_WITH_IDS
                | Capabilities::REMOVE_IDS;
        }
        match self.id_map {
            IdMapStage::None => {}
            IdMapStage::IdMap => caps |= Capabilities::ADD_WITH_IDS | Capabilities::REMOVE_IDS,
            IdMapStage::IdMap2 => {
                caps |= Capabilities::ADD_WITH_IDS
                    | Capabilities::REMOVE_IDS
                    | Capabilities::RECONSTRUCT
            }
        }
        if self.normalize {
            caps |= Capabilities::NORMALIZE;
        }
        caps
    }
}

impl std::fmt::Display for IndexSpec {
    /// Canonical spelling: normalization first, id map last.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.normalize {
            write!(f, "L2norm,")?;
        }
        match self.base {
            BaseStage::Flat => write!(f, "Flat")?,
            BaseStage::Ivf { nlist } => write!(f, "IVF{nlist},Flat")?,
        }
        match self.id_map {
            IdMapStage::None => Ok(()),
            IdMapStage::IdMap => write!(f, ",IDMap"),
            IdMapStage::IdMap2 => write!(f, ",IDMap2"),
        }
    }
}

impl FromStr for IndexSpec {
    type Err = VssError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VssError::BuildSpec(s.to_string());
        let mut stages = s.split(',').map(str::trim).peekable();

        let mut normalize = false;
        if stages.peek() == Some(&"L2norm") {
            normalize = true;
            stages.next();
        }

        let mut id_map = IdMapStage::None;
        if let Some(stage) = stages.peek().and_then(|t| parse_id_map(t)) {
            id_map = stage;
            stages.next();
        }

        let base = match stages.next() {
            Some("Flat") => BaseStage::Flat,
            Some(stage) => {
                let nlist = stage
                    .strip_prefix("IVF")
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(invalid)?;
                if stages.peek() == Some(&"Flat") {
                    stages.next();
                }
                BaseStage::Ivf { nlist }
            }
            None => return Err(invalid()),
        };

        if let Some(stage) = stages.next() {
            match parse_id_map(stage) {
                Some(suffix) if id_map == IdMapStage::None => id_map = suffix,
                _ => return Err(invalid()),
            }
        }

        if stages.next().is_some() {
            return Err(invalid());
        }

        Ok(IndexSpec {
            base,
            id_map,
            normalize,
        })
    }
}

fn parse_id_map(stage: &str) -> Option<IdMapStage> {
    match stage {
        "IDMap" => Some(IdMapStage::IdMap),
        "IDMap2" => Some(IdMapStage::IdMap2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(spec: &str) -> Capabilities {
        spec.parse::<IndexSpec>().unwrap().capabilities()
    }

    #[test]
    fn test_capability_table() {
        assert_eq!(caps("Flat"), Capabilities::empty());
        assert_eq!(
            caps("Flat,IDMap"),
            Capabilities::ADD_WITH_IDS | Capabilities::REMOVE_IDS
        );
        assert!(caps("Flat,IDMap2").contains(Capabilities::RECONSTRUCT));
        assert!(caps("IDMap2,Flat").contains(Capabilities::RECONSTRUCT));

        let ivf = caps("IVF4,Flat");
        assert!(ivf.contains(Capabilities::REQUIRES_TRAINING | Capabilities::ADD_WITH_IDS));
        assert!(!ivf.contains(Capabilities::RECONSTRUCT));
        assert!(caps("IVF4,Flat,IDMap2").contains(Capabilities::RECONSTRUCT));
        assert!(caps("L2norm,Flat,IDMap2").contains(Capabilities::NORMALIZE));
    }

    #[test]
    fn test_canonical_display() {
        for (input, canonical) in [
            ("Flat,IDMap2", "Flat,IDMap2"),
            ("IDMap2,Flat", "Flat,IDMap2"),
            ("IVF8", "IVF8,Flat"),
            (" IVF8 , Flat , IDMap ", "IVF8,Flat,IDMap"),
            ("L2norm,IDMap,Flat", "L2norm,Flat,IDMap"),
        ] {
            let spec: IndexSpec = input.parse().unwrap();
            assert_eq!(spec.to_string(), canonical);
        }
    }

    #[test]
    fn test_rejects_unknown_specs() {
        for bad in [
            "",
            "HNSW32",
            "Flat,IDMap2,IDMap",
            "IDMap,Flat,IDMap2",
            "IVF0,Flat",
            "IVFx,Flat",
            "Flat,Flat",
            "flat",
        ] {
            let err = bad.parse::<IndexSpec>().unwrap_err();
            assert_eq!(err.to_string(), format!("could not parse index string {bad}"));
        }
    }
}
