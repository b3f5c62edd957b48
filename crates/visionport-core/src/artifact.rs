use bytes::Bytes;

#[derive(Clone, Debug)]
pub enum ModelArtifact {
    OnnxPath(std::path::PathBuf),
    OnnxBytes(Bytes),
}

impl ModelArtifact {
    pub fn describe(&self) -> String {
        match self {
            ModelArtifact::OnnxPath(path) => path.display().to_string(),
            ModelArtifact::OnnxBytes(bytes) => format!("<{} in-memory bytes>", bytes.len()),
        }
    }
}
