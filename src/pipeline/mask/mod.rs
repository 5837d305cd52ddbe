pub mod dictionary;
pub mod entity_mask;

pub use dictionary::{MedicineDictionary, MedicineMatch};
pub use entity_mask::{
    localize_generics, placeholders_in, unmask, unmask_expecting, EntityMask, EntityMaskMap,
    MaskedEntity, StreamUnmasker, UnmaskStyle,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaskError {
    #[error("Placeholder corrupted in translation: {0}")]
    Corrupted(String),

    #[error("Unknown placeholder: {0}")]
    UnknownPlaceholder(String),

    #[error("Placeholder dropped in translation: {0}")]
    Missing(String),
}
