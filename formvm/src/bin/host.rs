//! Minimal command-line driver: maps a form file, looks up one script by
//! name, runs it, and dumps the resulting stack frame.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use formvm::raw::form::Form;
use formvm::VM;

#[derive(Parser)]
#[command(version, about = "Runs a single script from a binary form file")]
struct Args {
	/// Path to the form file to map and decode.
	#[arg(default_value = "data.win")]
	form_path: std::path::PathBuf,

	/// Name of the script to execute.
	entry_script: String,

	/// Pushes a single i32 argument onto the stack before running the script.
	#[arg(long)]
	argument: Option<i32>,
}

fn main() -> ExitCode {
	#[cfg(feature = "tracing")]
	tracing_subscriber::fmt::init();

	let args = Args::parse();
	match run(&args) {
		Ok(()) => ExitCode::SUCCESS,
		Err(code) => code,
	}
}

fn run(args: &Args) -> Result<(), ExitCode> {
	let bytes = map_file(&args.form_path).map_err(|error| {
		eprintln!("Missing or unreadable '{}': {error}", args.form_path.display());
		ExitCode::from(1)
	})?;

	let form = Form::read(bytes).map_err(|error| {
		eprintln!("Failed to decode '{}': {error}", args.form_path.display());
		ExitCode::from(1)
	})?;

	let script = form.script_by_name(&args.entry_script).ok_or_else(|| {
		eprintln!("No script named '{}' in this form", args.entry_script);
		ExitCode::from(1)
	})?;

	let mut vm = VM::new(&form);
	if let Some(argument) = args.argument {
		vm.push_stack_variable(argument).map_err(|error| {
			eprintln!("Failed to seed argument: {error:?}");
			ExitCode::from(1)
		})?;
	}

	vm.run(script).map_err(|fault| {
		eprintln!("{fault}");
		ExitCode::from(2)
	})?;

	println!("FINAL STACK:");
	vm.print_stack_frame();
	Ok(())
}

#[cfg(feature = "memmap2")]
fn map_file(path: &std::path::Path) -> Result<Arc<[u8]>, std::io::Error> {
	let file = std::fs::File::open(path)?;
	let bytes = unsafe { memmap2::Mmap::map(&file)? };
	Ok(Arc::from(bytes.as_ref()))
}

#[cfg(not(feature = "memmap2"))]
fn map_file(path: &std::path::Path) -> Result<Arc<[u8]>, std::io::Error> {
	let bytes = std::fs::read(path)?;
	Ok(Arc::from(bytes.as_slice()))
}
