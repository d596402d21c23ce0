use std::env;
use vaccel::ops::exec::exec_with_resource;
use vaccel::{ArgCodec, ArgList, Resource, ResourceType, Session};

struct MyData;

// length-prefixed array of u32 words
impl ArgCodec for MyData {
    type Value = Vec<u32>;

    fn encode(&self, value: &Vec<u32>) -> vaccel::Result<Vec<u8>> {
        let mut words = Vec::with_capacity(value.len() + 1);
        words.push(value.len() as u32);
        words.extend_from_slice(value);
        Ok(bytemuck::cast_slice::<u32, u8>(&words).to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> vaccel::Result<Vec<u32>> {
        let words = bytemuck::pod_collect_to_vec::<u8, u32>(bytes);
        let (len, rest) = words
            .split_first()
            .ok_or_else(|| vaccel::Error::invalid("empty buffer"))?;
        rest.get(..*len as usize)
            .map(<[u32]>::to_vec)
            .ok_or_else(|| vaccel::Error::invalid("truncated buffer"))
    }
}

fn main() -> vaccel::Result<()> {
    let args = env::args().collect::<Vec<_>>();
    if args.len() != 2 {
        println!("Usage: {} <shared-object>", args[0]);
        return Ok(());
    }

    let shared_object = Resource::new(&args[1], ResourceType::Lib)?;
    let mut session = Session::init(0)?;
    session.register(&shared_object)?;

    let input = (1..=5).map(|i| 10 * i).collect::<Vec<u32>>();
    println!("Input: {:?}", input);

    let mut read = ArgList::with_capacity(1)?;
    read.add_non_serial_arg(&input, &MyData)?;
    let mut write = ArgList::with_capacity(1)?;
    write.expect_non_serial_arg((input.len() + 1) * 4)?;

    exec_with_resource(&session, &shared_object, "mytestfunc_nonser", &read, &mut write)?;
    println!("Output: {:?}", write.extract_non_serial_arg(0, &MyData)?);

    write.delete()?;
    read.delete()?;
    session.unregister(&shared_object)?;
    shared_object.release()?;
    session.release()
}
