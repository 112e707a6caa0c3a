use std::io;

use crate::cmd::LinkArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_config, OutputFormat};

pub fn run(link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let config = link.resolve()?;
    print_config(&config, format, &mut io::stdout());
    Ok(SUCCESS)
}
