use std::env;
use std::error::Error;
use vergen::{BuildBuilder, Emitter};

fn main() -> Result<(), Box<dyn Error>> {
    // Tracing features compiled in, reported by get_build_info()
    let traces: Vec<&str> = [
        ("CARGO_FEATURE_TRACE_ARITH", "trace_arith"),
        ("CARGO_FEATURE_TRACE_ENCODER", "trace_encoder"),
    ]
    .into_iter()
    .filter(|(var, _)| env::var_os(var).is_some())
    .map(|(_, name)| name)
    .collect();
    println!("cargo:rustc-env=JBIG2_TRACE_FEATURES={}", traces.join(","));

    let build = BuildBuilder::default().build_timestamp(true).build()?;
    Emitter::default().add_instructions(&build)?.emit()?;
    Ok(())
}
