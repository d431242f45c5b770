use std::sync::Arc;

use crate::error::CopilotError;

/// Course specialties offered by the catalog, in display order.
pub const DEFAULT_SPECIALTIES: [&str; 21] = [
    "Cardiologia",
    "Clínica Médica",
    "Cuidados Paliativos",
    "Dermatologia",
    "Endocrinologia",
    "Geriatria",
    "Ginecologia e Obstetrícia",
    "Medicina da Dor",
    "Medicina de Emergência",
    "Medicina de Família e Comunidade",
    "Medicina do Esporte",
    "Medicina do Trabalho",
    "Medicina Endocanabinóide",
    "Neurologia",
    "Nutrologia",
    "Obesidade e Emagrecimento",
    "Pediatria",
    "Perícias Médicas",
    "Psiquiatria",
    "Psiquiatria da Infância e Adolescência",
    "Terapia Intensiva",
];

/// Closed, ordered set of specialty labels. Cheap to clone; never mutated
/// after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialtyTaxonomy {
    labels: Arc<[String]>,
}

impl SpecialtyTaxonomy {
    /// Build a taxonomy from an ordered list. Labels are trimmed, duplicates
    /// keep their first position, and blank labels are rejected.
    pub fn new<I, S>(labels: I) -> Result<Self, CopilotError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            if label.is_empty() {
                return Err(CopilotError::InvalidConfig {
                    key: "SPECIALTIES",
                    reason: "specialty labels cannot be blank".to_string(),
                });
            }
            if !unique.iter().any(|known| known == label) {
                unique.push(label.to_string());
            }
        }
        if unique.is_empty() {
            return Err(CopilotError::InvalidConfig {
                key: "SPECIALTIES",
                reason: "at least one specialty is required".to_string(),
            });
        }
        Ok(Self {
            labels: unique.into(),
        })
    }

    /// Parse a `;`-separated override such as `Cardiologia;Pediatria`.
    pub fn parse_list(raw: &str) -> Result<Self, CopilotError> {
        Self::new(raw.split(';'))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.canonical(label).is_some()
    }

    /// The taxonomy's own spelling of `label`, if it is a member.
    pub fn canonical(&self, label: &str) -> Option<&str> {
        let label = label.trim();
        self.labels
            .iter()
            .find(|known| known.as_str() == label)
            .map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels rendered as a JSON array, the way the classifier prompt lists them.
    pub fn to_prompt_list(&self) -> String {
        serde_json::to_string(&*self.labels).unwrap_or_else(|_| "[]".to_string())
    }
}

impl Default for SpecialtyTaxonomy {
    fn default() -> Self {
        Self {
            labels: DEFAULT_SPECIALTIES
                .iter()
                .map(|label| label.to_string())
                .collect::<Vec<_>>()
                .into(),
        }
    }
}
