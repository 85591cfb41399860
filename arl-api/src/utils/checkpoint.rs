use candle_core::{Error, Result, Tensor};
use candle_nn::VarMap;
use safetensors::SafeTensors;
use std::{collections::HashMap, path::Path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointMetadata {
    pub iteration: usize,
    pub environment: String,
}

impl CheckpointMetadata {
    fn into_map(self) -> HashMap<String, String> {
        HashMap::from([
            ("iteration".to_owned(), self.iteration.to_string()),
            ("environment".to_owned(), self.environment),
        ])
    }

    fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let field = |key: &str| {
            map.get(key)
                .ok_or_else(|| Error::Msg(format!("checkpoint metadata has no {key}")))
        };
        Ok(Self {
            iteration: field("iteration")?.parse().map_err(Error::wrap)?,
            environment: field("environment")?.clone(),
        })
    }
}

fn named_tensors(varmaps: &[&VarMap]) -> Result<Vec<(String, Tensor)>> {
    let mut tensors: Vec<(String, Tensor)> = Vec::new();
    for varmap in varmaps {
        let data = varmap
            .data()
            .lock()
            .map_err(|_| Error::Msg("varmap lock poisoned".into()))?;
        for (name, var) in data.iter() {
            if tensors.iter().any(|(n, _)| n == name) {
                return Err(Error::Msg(format!("variable {name} is in two varmaps")));
            }
            tensors.push((name.clone(), var.as_tensor().clone()));
        }
    }
    tensors.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(tensors)
}

/// Writes every variable of `varmaps` to a single safetensors file, with the metadata stored as
/// strings in the file header.
pub fn save_checkpoint(
    varmaps: &[&VarMap],
    path: impl AsRef<Path>,
    metadata: CheckpointMetadata,
) -> Result<()> {
    let tensors = named_tensors(varmaps)?;
    safetensors::serialize_to_file(tensors, Some(metadata.into_map()), path.as_ref())
        .map_err(Error::wrap)
}

/// Overwrites the variables of `varmaps` with the values stored at `path`. Every variable has to
/// be present in the file.
pub fn load_checkpoint(varmaps: &[&VarMap], path: impl AsRef<Path>) -> Result<CheckpointMetadata> {
    let path = path.as_ref();
    let buffer = std::fs::read(path).map_err(Error::wrap)?;
    let (_, metadata) = SafeTensors::read_metadata(&buffer).map_err(Error::wrap)?;
    let metadata = metadata
        .metadata()
        .as_ref()
        .ok_or_else(|| Error::Msg(format!("{} carries no metadata", path.display())))?;
    let metadata = CheckpointMetadata::from_map(metadata)?;
    for varmap in varmaps {
        let mut varmap = (*varmap).clone();
        varmap.load(path)?;
    }
    Ok(metadata)
}

#[cfg(test)]
mod test {
    use super::{CheckpointMetadata, load_checkpoint, save_checkpoint};
    use candle_core::{DType, Device, Result, Tensor};
    use candle_nn::{Init, VarBuilder, VarMap};

    #[test]
    fn variables_and_metadata_survive_a_round_trip() -> Result<()> {
        let path = std::env::temp_dir().join(format!("arl-ckpt-{}.safetensors", std::process::id()));
        let policy = VarMap::new();
        let value = VarMap::new();
        VarBuilder::from_varmap(&policy, DType::F32, &Device::Cpu).get_with_hints(
            3,
            "policy.w",
            Init::Const(1.),
        )?;
        VarBuilder::from_varmap(&value, DType::F32, &Device::Cpu).get_with_hints(
            2,
            "value.w",
            Init::Const(2.),
        )?;
        let metadata = CheckpointMetadata {
            iteration: 7,
            environment: "CartPole-v1".into(),
        };
        save_checkpoint(&[&policy, &value], &path, metadata.clone())?;

        let restored_policy = VarMap::new();
        let restored_value = VarMap::new();
        let w = VarBuilder::from_varmap(&restored_policy, DType::F32, &Device::Cpu)
            .get_with_hints(3, "policy.w", Init::Const(0.))?;
        VarBuilder::from_varmap(&restored_value, DType::F32, &Device::Cpu).get_with_hints(
            2,
            "value.w",
            Init::Const(0.),
        )?;
        let loaded = load_checkpoint(&[&restored_policy, &restored_value], &path)?;
        assert_eq!(loaded, metadata);
        assert_eq!(w.to_vec1::<f32>()?, vec![1., 1., 1.]);
        let data = restored_value.data().lock().map_err(|_| candle_core::Error::Msg("lock".into()))?;
        let v: &Tensor = data["value.w"].as_tensor();
        assert_eq!(v.to_vec1::<f32>()?, vec![2., 2.]);
        Ok(())
    }
}
