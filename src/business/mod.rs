pub mod record;

pub use record::{RecordBusiness, RecordBusinessBuilder, RecordReader, RecordWriter};
