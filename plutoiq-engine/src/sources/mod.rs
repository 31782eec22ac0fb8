mod pluto;

pub use pluto::PlutoSource;
