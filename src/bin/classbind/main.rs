use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use classbind::{
    BindingConfig, Lookup, ModifierExtractor, ModifierSet, Runtime, StubSpec, Synthesizer,
    loader::ClassPathEntry,
    metadata::{Annotation, CompiledUnit},
    runtime::ClassOrigin,
};

#[derive(Parser)]
#[command(name = "classbind")]
#[command(about = "Inspect compiled classes and generate native-backed subclasses")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extra class-path entry (directory, .jar or .zip); repeatable
    #[arg(long = "class-path", short = 'c', global = true, value_name = "PATH")]
    class_path: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the methods and fields of a class with their annotations
    Members {
        #[arg(value_name = "CLASS")]
        class: String,
    },

    /// Print the static/nullable modifiers of a member
    Modifiers {
        #[arg(value_name = "CLASS")]
        class: String,

        #[arg(value_name = "MEMBER")]
        member: String,

        /// Exact descriptor; every overload is shown when omitted
        #[arg(value_name = "DESCRIPTOR")]
        descriptor: Option<String>,

        /// Zero-based parameter index
        #[arg(long, conflicts_with = "field")]
        param: Option<usize>,

        /// Query a field instead of a method
        #[arg(long)]
        field: bool,
    },

    /// Generate a subclass with native stubs and write its bytes
    Synth {
        #[arg(value_name = "SIMPLE_NAME")]
        simple_name: String,

        /// Superclass, defaults to java.lang.Object
        #[arg(long = "super", value_name = "CLASS")]
        superclass: Option<String>,

        /// Stub as name:descriptor; repeatable
        #[arg(long = "method", short = 'm', value_name = "NAME:DESCRIPTOR", value_parser = parse_stub)]
        methods: Vec<(String, String)>,

        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

fn parse_stub(input: &str) -> Result<(String, String), String> {
    match input.split_once(':') {
        Some((name, descriptor)) if !name.is_empty() && !descriptor.is_empty() => {
            Ok((name.to_string(), descriptor.to_string()))
        }
        _ => Err(format!("expected NAME:DESCRIPTOR, got {input:?}")),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BindingConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BindingConfig::default(),
    };
    config.class_path.extend(cli.class_path.iter().cloned());
    let runtime = Runtime::new(config)?;

    match &cli.command {
        Commands::Members { class } => print_members(&runtime, class)?,
        Commands::Modifiers {
            class,
            member,
            descriptor,
            param,
            field,
        } => print_modifiers(
            &runtime,
            class,
            member,
            descriptor.as_deref(),
            *param,
            *field,
        )?,
        Commands::Synth {
            simple_name,
            superclass,
            methods,
            output,
        } => {
            let spec = StubSpec {
                simple_name: simple_name.clone(),
                superclass: superclass.clone(),
                methods: methods.clone(),
            };
            let bytes = Synthesizer::new(&runtime).generate(&spec)?;
            fs::write(output, &bytes)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "{} ({} bytes) -> {}",
                runtime.config().generated_class_name(simple_name),
                bytes.len(),
                output.display()
            );
        }
    }
    Ok(())
}

fn compiled_unit(runtime: &Runtime, class: &str) -> Result<CompiledUnit> {
    let class = runtime.class_for_name(class)?;
    let bytes = class.compiled_bytes(runtime.class_path())?;
    if let ClassOrigin::ClassPath(entry) = class.origin() {
        let kind = match entry {
            ClassPathEntry::Archive(_) => "archive",
            ClassPathEntry::Directory(_) => "directory",
        };
        log::info!("{} from {kind} {}", class.name(), entry.path().display());
    }
    Ok(CompiledUnit::parse(&bytes)?)
}

fn annotation_list(annotations: &[Annotation]) -> String {
    annotations
        .iter()
        .map(|annotation| format!(" @{}", annotation.type_descriptor))
        .collect()
}

fn print_members(runtime: &Runtime, class: &str) -> Result<()> {
    let unit = compiled_unit(runtime, class)?;
    println!(
        "{} extends {} (version {}.{})",
        unit.name,
        unit.super_name.as_deref().unwrap_or("-"),
        unit.major_version,
        unit.minor_version
    );
    for field in &unit.fields {
        println!(
            "  field  {} {}{}",
            field.name,
            field.descriptor,
            annotation_list(&field.annotations)
        );
    }
    for method in &unit.methods {
        println!(
            "  method {}{}{}",
            method.name,
            method.descriptor,
            annotation_list(&method.annotations)
        );
        if let Some(parameters) = &method.parameter_annotations {
            for (index, annotations) in parameters.iter().enumerate() {
                if !annotations.is_empty() {
                    println!("    param {index}{}", annotation_list(annotations));
                }
            }
        }
    }
    Ok(())
}

fn describe(lookup: &Lookup) -> String {
    match lookup {
        Lookup::Found(modifiers) if modifiers.is_empty() => "none".to_string(),
        Lookup::Found(modifiers) => format_modifiers(*modifiers),
        Lookup::Missing(miss) => format!("none (lookup failed: {miss})"),
    }
}

fn format_modifiers(modifiers: ModifierSet) -> String {
    modifiers
        .iter_names()
        .map(|(name, _)| name)
        .collect::<Vec<_>>()
        .join(" | ")
}

fn print_modifiers(
    runtime: &Runtime,
    class: &str,
    member: &str,
    descriptor: Option<&str>,
    param: Option<usize>,
    field: bool,
) -> Result<()> {
    let descriptors: Vec<String> = match descriptor {
        Some(descriptor) => vec![descriptor.to_string()],
        None => {
            let unit = compiled_unit(runtime, class)?;
            let found: Vec<String> = if field {
                unit.fields
                    .iter()
                    .filter(|candidate| candidate.name == member)
                    .map(|candidate| candidate.descriptor.clone())
                    .collect()
            } else {
                unit.overloads(member)
                    .map(|candidate| candidate.descriptor.clone())
                    .collect()
            };
            if found.is_empty() {
                bail!("{} declares no member {member}", unit.name);
            }
            found
        }
    };

    let extractor = ModifierExtractor::new(runtime);
    for descriptor in descriptors {
        let lookup = match (field, param) {
            (true, _) => extractor.lookup_field(class, member, &descriptor)?,
            (false, Some(index)) => extractor.lookup_parameter(class, member, &descriptor, index)?,
            (false, None) => extractor.lookup_method(class, member, &descriptor)?,
        };
        match param {
            Some(index) => println!("{member}{descriptor} param {index}: {}", describe(&lookup)),
            None => println!("{member} {descriptor}: {}", describe(&lookup)),
        }
    }
    Ok(())
}
