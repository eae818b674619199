pub mod collaborators;
pub mod command;
pub mod history;
pub mod session;
pub mod validation;

pub mod errors {
    use annot_core::document::ModelError;
    use annot_core::geometry::GeometryError;
    use thiserror::Error;

    use crate::collaborators::CollaboratorError;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error(transparent)]
        MalformedGeometry(#[from] GeometryError),
        #[error(
            "could not create a \"{class}\" annotation: the range \"{area}\" is not inside the borders of a \"{container}\" annotation"
        )]
        NotContained {
            class: String,
            container: String,
            area: String,
        },
        #[error(
            "could not create a \"{class}\" annotation: the range \"{area}\" overlaps with the existing annotation {conflicting}"
        )]
        Overlapping {
            class: String,
            area: String,
            conflicting: String,
        },
        #[error("unknown annotation class `{0}`")]
        UnknownClass(String),
        #[error("annotation `{name}` not found on sheet `{sheet}`")]
        RegionNotFound { sheet: String, name: String },
        #[error("sheet `{0}` is not part of the workbook")]
        UnknownSheet(String),
        #[error("sheet `{0}` does not contain any annotations yet")]
        EmptySheet(String),
        #[error("the workbook does not contain any annotations yet")]
        EmptyWorkbook,
        #[error("operation failed: {0}")]
        Collaborator(#[from] CollaboratorError),
        #[error(transparent)]
        Model(#[from] ModelError),
    }

    impl EngineError {
        /// 是否属于校验拒绝（而非协作方或模型故障）。
        pub fn is_rejection(&self) -> bool {
            matches!(
                self,
                EngineError::MalformedGeometry(_)
                    | EngineError::NotContained { .. }
                    | EngineError::Overlapping { .. }
            )
        }
    }
}
