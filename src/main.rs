#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::process::exit;

use ylt::{
    Consumer, DebugConsumer, EmitterConsumer, Error, Executor, ParserProducer, Producer,
    TestRunner,
};

fn usage() -> &'static str {
    "Usage: ylt [-i FILE] [-o FILE] [-d] [-t]\n\
\n\
Renders a YAML template: nodes tagged !name are evaluated in an\n\
embedded Lua runtime and replaced by the result; everything else is\n\
passed through unchanged.\n\
\n\
Options:\n\
  -i, --in FILE    Input file to read from (`-` means stdin, the default)\n\
  -o, --out FILE   Output file to write to (`-` means stdout, the default)\n\
  -d, --debug      Dump events and values instead of emitting YAML\n\
  -t, --test       Treat the stream as (input, expected) document pairs\n\
                   and verify that evaluation reproduces the expected\n\
                   output\n\
  -h, --help       Show this help"
}

struct Args {
    input: Option<String>,
    output: Option<String>,
    debug: bool,
    test: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        input: None,
        output: None,
        debug: false,
        test: false,
    };
    let mut raw = std::env::args().skip(1);
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "-i" | "--in" => match raw.next() {
                Some(path) => args.input = Some(path),
                None => {
                    eprintln!("Missing argument for {arg}\n\n{}", usage());
                    exit(2);
                }
            },
            "-o" | "--out" => match raw.next() {
                Some(path) => args.output = Some(path),
                None => {
                    eprintln!("Missing argument for {arg}\n\n{}", usage());
                    exit(2);
                }
            },
            "-d" | "--debug" => args.debug = true,
            "-t" | "--test" => args.test = true,
            "-h" | "--help" => {
                println!("{}", usage());
                exit(0);
            }
            _ => {
                eprintln!("Unknown option: {arg}\n\n{}", usage());
                exit(2);
            }
        }
    }
    args
}

fn run(producer: &mut dyn Producer, consumer: &mut dyn Consumer, test: bool) -> Result<(), Error> {
    if test {
        TestRunner::new()?.run(producer, consumer)
    } else {
        Executor::new()?.execute_stream(producer, consumer)
    }
}

fn main() {
    env_logger::init();
    let args = parse_args();

    let mut reader: Box<dyn BufRead> = match args.input.as_deref() {
        None | Some("-") => Box::new(BufReader::new(std::io::stdin())),
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(err) => {
                eprintln!("Error opening input file {path}: {err}");
                exit(2);
            }
        },
    };
    let mut writer: Box<dyn Write> = match args.output.as_deref() {
        None | Some("-") => Box::new(std::io::stdout()),
        Some(path) => match File::create(path) {
            Ok(file) => Box::new(file),
            Err(err) => {
                eprintln!("Error opening output file {path}: {err}");
                exit(2);
            }
        },
    };

    let mut producer = ParserProducer::new(&mut *reader);
    let result = if args.debug {
        let mut consumer = DebugConsumer::new(&mut *writer);
        run(&mut producer, &mut consumer, args.test)
    } else {
        let mut consumer = EmitterConsumer::new(&mut *writer);
        run(&mut producer, &mut consumer, args.test).and_then(|()| consumer.finish())
    };

    if let Err(err) = result {
        eprintln!("{err}");
        exit(1);
    }
}
