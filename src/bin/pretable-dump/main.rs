use std::ffi;

use structopt::StructOpt;

use pretable::{Config, Table};

#[derive(Debug, StructOpt, Clone)]
struct Opt {
    /// Directory holding the table's data/index/header files.
    dir: String,

    /// Table name (filename prefix).
    name: String,

    #[structopt(long = "record-size", default_value = "16")]
    record_size: usize,
}

fn main() {
    let opt = Opt::from_args();

    let dir: ffi::OsString = opt.dir.into();
    let config = Config::new(&dir, &opt.name, opt.record_size);

    match Table::open(config) {
        Ok(table) => {
            println!("{}", table.stats());
            match table.validate() {
                Ok(()) => println!("validate: ok"),
                Err(err) => {
                    eprintln!("validate: {}", err);
                    std::process::exit(1);
                }
            }
        }
        Err(err) => {
            eprintln!("open: {}", err);
            std::process::exit(1);
        }
    }
}
