use std::path::Path;

use clireflect::{BindingFlags, Loader};

fn main() {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: clireflect <assembly>");
        std::process::exit(2);
    };
    if let Err(error) = dump(Path::new(&path)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn dump(path: &Path) -> clireflect::Result<()> {
    let directory = path.parent().unwrap_or(Path::new("."));
    let loader = Loader::with_search_directories([directory]);
    let assembly = loader.load_assembly_path(path)?;

    println!("{}", assembly.name()?.full_name());
    for name in assembly.referenced_assembly_names() {
        println!("  -> {}", name?.full_name());
    }

    let binding = BindingFlags::PUBLIC
        | BindingFlags::NON_PUBLIC
        | BindingFlags::INSTANCE
        | BindingFlags::STATIC;
    for ty in assembly.types() {
        println!("{}", ty.full_name()?);
        for method in ty.methods(binding | BindingFlags::DECLARED_ONLY)? {
            let method = method?;
            println!("  {} {}", method.name()?, method.signature()?);
        }
    }
    Ok(())
}
