use crate::model::Comid;
use crate::pollutant::ComidType;
use crate::table::Stage;

pub type AssessmentResult<T> = Result<T, AssessmentError>;

#[derive(thiserror::Error, Debug)]
pub enum AssessmentError {
    #[error("comid_type must be 'reach' or 'catch', got '{0}'")]
    InvalidComidType(String),

    #[error("{stage} needs column '{column}', which is added by {requires}")]
    StageOrder {
        stage: Stage,
        column: String,
        requires: Stage,
    },

    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{0}' already exists with different values")]
    ColumnConflict(String),

    #[error("unknown run group key {0}")]
    UnknownRunGroup(u8),

    #[error("no baseline run group configured")]
    NoBaseline,

    #[error("comid {0} appears more than once in the geometry table")]
    DuplicateComid(Comid),

    #[error("table holds {found} rows but the calculation was asked for {expected}")]
    ComidTypeMismatch {
        expected: ComidType,
        found: ComidType,
    },

    #[error("invalid value '{value}' for column '{column}' on line {line}")]
    Parse {
        column: String,
        value: String,
        line: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}
