pub mod cell_enumerator;
pub mod cleanser;
pub mod coverage;
pub mod cycle;
pub mod metrics;
pub mod observation;
pub mod reconstructor;
pub mod signal_color;
pub mod source;
pub mod utils;
pub mod validator;
