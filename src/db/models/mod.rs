pub mod annotation_record;

pub use annotation_record::AnnotationRecord;
