use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

use crate::domain::errors::{DomainError, DomainResult};

pub const IMAGE_OUTPUT: &str = "detected.jpg";
pub const VIDEO_OUTPUT: &str = "detected.mp4";

/// Prefijo de URL bajo el que se sirven los resultados.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Directorio de resultados. Guarda la última imagen y el último vídeo
/// anotados (se sobrescriben en cada ejecución) y las subidas temporales.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    pub fn create(root: impl Into<PathBuf>) -> DomainResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            DomainError::OperationFailed(format!("no se pudo crear {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_output(&self) -> PathBuf {
        self.root.join(IMAGE_OUTPUT)
    }

    pub fn video_output(&self) -> PathBuf {
        self.root.join(VIDEO_OUTPUT)
    }

    pub fn public_url(name: &str) -> String {
        format!("{PUBLIC_PREFIX}/{name}")
    }

    /// Escribe la subida en un temporal dentro del directorio, conservando la
    /// extensión para que los decodificadores la reconozcan. Se borra al soltarlo.
    pub fn store_upload(&self, bytes: &[u8], extension: &str) -> DomainResult<NamedTempFile> {
        let suffix = format!(".{extension}");
        let mut tmp = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(&self.root)
            .map_err(|e| DomainError::OperationFailed(format!("no se pudo crear el temporal: {e}")))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.flush())
            .map_err(|e| DomainError::OperationFailed(format!("no se pudo guardar la subida: {e}")))?;
        Ok(tmp)
    }

    /// Resuelve un nombre pedido por HTTP a un archivo dentro del directorio.
    /// Sólo se acepta un único componente de ruta normal; cualquier intento de
    /// salir del directorio es `InvalidInput`, aunque el destino exista.
    pub fn resolve(&self, name: &str) -> DomainResult<PathBuf> {
        validate_file_name(name)?;

        let candidate = self.root.join(name);
        if !candidate.is_file() {
            return Err(DomainError::NotFound(name.to_string()));
        }

        // Un enlace simbólico podría apuntar fuera.
        let root = self.root.canonicalize().map_err(|e| DomainError::OperationFailed(e.to_string()))?;
        let resolved = candidate
            .canonicalize()
            .map_err(|_| DomainError::NotFound(name.to_string()))?;
        if !resolved.starts_with(&root) {
            return Err(DomainError::InvalidInput(format!("ruta fuera del directorio: {name}")));
        }
        Ok(resolved)
    }
}

fn validate_file_name(name: &str) -> DomainResult<()> {
    let reject = || DomainError::InvalidInput(format!("nombre de archivo no permitido: {name}"));

    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(reject());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(reject()),
    }
}
