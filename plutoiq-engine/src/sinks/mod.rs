mod samples;

pub use samples::SampleSink;
