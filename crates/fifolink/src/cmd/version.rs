use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::format_sync;

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("fifolink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: fifolink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("FIFOLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("FIFOLINK_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!(
        "default_frame: {} bytes, sync {}",
        fifolink_frame::DEFAULT_FRAME_SIZE,
        format_sync(fifolink_frame::DEFAULT_SYNC)
    );
    println!(
        "radio: simulated (fifo {} bytes)",
        fifolink_transport::RFM69_FIFO_SIZE
    );
    println!("features: link={}, cli=true", cfg!(feature = "link"));

    Ok(SUCCESS)
}
