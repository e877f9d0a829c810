use super::detection::Detection;

/// Umbral de confianza por defecto del clasificador.
pub const DEFAULT_CONFIDENCE: f32 = 0.25;

pub const DEFAULT_KEYWORDS: &[&str] = &[
    "pistol",
    "rifle",
    "knife",
    "shotgun",
    "grenade",
    "baseball bat",
    "gun",
    "weapon",
];

/// Lista ordenada e inmutable de subcadenas (en minúsculas) que identifican un arma.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaponKeywords {
    keywords: Vec<String>,
}

impl WeaponKeywords {
    /// Normaliza a minúsculas, recorta espacios y descarta vacíos y duplicados
    /// conservando el orden de aparición.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for kw in keywords {
            let kw = kw.as_ref().trim().to_lowercase();
            if !kw.is_empty() && !out.contains(&kw) {
                out.push(kw);
            }
        }
        Self { keywords: out }
    }

    /// Parsea una lista separada por comas, p. ej. `"pistol, rifle,knife"`.
    pub fn parse_csv(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Coincidencia por subcadena, sin distinguir mayúsculas: "riflescope" contiene "rifle".
    pub fn matches(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.keywords.iter().any(|kw| label.contains(kw.as_str()))
    }

    /// Detecciones con confianza >= umbral cuya etiqueta contiene alguna palabra clave.
    pub fn weapon_detections<'a>(
        &'a self,
        detections: &'a [Detection],
        threshold: f32,
    ) -> impl Iterator<Item = &'a Detection> + 'a {
        detections
            .iter()
            .filter(move |d| d.confidence >= threshold)
            .filter(move |d| self.matches(&d.label))
    }

    pub fn is_weapon(&self, detections: &[Detection], threshold: f32) -> bool {
        self.weapon_detections(detections, threshold).next().is_some()
    }
}

impl Default for WeaponKeywords {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS.iter().copied())
    }
}
