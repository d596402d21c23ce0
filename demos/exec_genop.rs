use std::env;
use vaccel::{ArgList, Config, OpType, Session};

const INPUT: i32 = 10;

fn main() -> vaccel::Result<()> {
    let args = env::args().collect::<Vec<_>>();
    if args.len() < 2 || args.len() > 3 {
        println!("Usage: {} <lib_file> [iterations]", args[0]);
        return Ok(());
    }

    let library = &args[1];
    let iters = match args.get(2).map(|s| s.parse::<usize>()) {
        Some(Ok(n)) => n,
        Some(Err(_)) => {
            println!("error converting input iterations, assuming 1..");
            1
        }
        None => 1,
    };

    let config = Config::from_env();
    vaccel::logging::init(&config);
    let mut session = Session::with_config(&config, 0)?;

    let mut read = ArgList::with_capacity(4)?;
    read.add_int32_arg(OpType::Exec.code())?;
    read.add_string_arg(library)?;
    read.add_string_arg("mytestfunc")?;
    read.add_int32_arg(INPUT)?;

    let mut output = [0u8; 4];
    let mut write = ArgList::with_capacity(1)?;
    write.expect_serial_arg(&mut output)?;

    for _ in 0..iters {
        vaccel::genop(&session, &read, &mut write)?;
    }
    println!("Output: {}", write.extract_int32_arg(0)?);

    write.delete()?;
    read.delete()?;
    session.release()
}
