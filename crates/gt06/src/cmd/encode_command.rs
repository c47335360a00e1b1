use gt06_message::{encode_command, ParsedCommand, SERVER_FLAG};

use crate::cmd::EncodeCommandArgs;
use crate::exit::{encode_error, CliResult, SUCCESS};
use crate::output::{print_command, OutputFormat};

pub fn run(args: EncodeCommandArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = encode_command(&args.text, args.serial)
        .map_err(|err| encode_error(&format!("cannot encode {:?}", args.text), err))?;

    let command = ParsedCommand {
        serial: args.serial,
        server_flag: SERVER_FLAG,
        text: args.text,
    };
    print_command(&command, &frame, format);
    Ok(SUCCESS)
}
