pub mod error;
pub mod traits;
pub mod types;

pub use error::SlipError;
pub use traits::{LearningQueue, TemplateStore, VisionOcr};
pub use types::{
    ExpectedPayment, ExtractionPattern, FieldType, IssuerTemplate, LearningRecord,
    MerchantPattern, MerchantPatternSet, PatternSource, PaymentFields, ProcessingMethod,
    VerificationOutcome, VerificationStatus, VisionHints, VisionVerdict, UNKNOWN_ISSUER,
};
