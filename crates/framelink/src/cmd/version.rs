use framelink_frame::{DEFAULT_MAX_PAYLOAD, SYNC_MARKER};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("framelink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: framelink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("FRAMELINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("FRAMELINK_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("sync_marker: 0x{SYNC_MARKER:08X}");
    println!("checksum: crc16/x-25");
    println!("max_payload: {DEFAULT_MAX_PAYLOAD}");
    println!("features: net={}, cli=true", cfg!(feature = "net"));

    Ok(SUCCESS)
}
