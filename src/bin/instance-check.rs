use instance_markup::{
    parse_instance, parse_styles, parse_xml, DefaultNameClassifier, Diagnostic, Diagnostics,
    InstanceError, InstanceStyleContext, Manifest, Resource, ResourceStore, TextPos,
};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

struct Options {
    emit: bool,
    dump: bool,
    inputs: Vec<String>,
}

/// An instance document waiting for styles to be registered.
struct PendingInstance {
    resource: String,
    text: String,
}

fn main() {
    init_logging();

    let options = match parse_args(env::args().skip(1)) {
        Some(options) => options,
        None => {
            print_usage();
            process::exit(1);
        }
    };

    let mut exit_code = 0;
    let mut store = ResourceStore::new();
    let mut pending = Vec::new();
    let mut diagnostics = Diagnostics::new();

    for input in &options.inputs {
        if let Err(e) = collect_input(input, &mut store, &mut pending, &mut diagnostics) {
            eprintln!("✗ {} could not be read:", input);
            print_error(&e);
            exit_code = 1;
        }
    }
    log::debug!("{} resource(s) registered", store.len());

    for instance in pending {
        let before = diagnostics.len();
        match check_instance(&instance, &store, &options, &mut diagnostics) {
            Ok(()) if diagnostics.len() == before => println!("✓ {} is valid", instance.resource),
            Ok(()) => println!("✗ {} has errors", instance.resource),
            Err(e) => {
                eprintln!("✗ {} could not be checked:", instance.resource);
                print_error(&e);
                exit_code = 1;
            }
        }
    }

    if !diagnostics.is_empty() {
        print_diagnostics(&diagnostics);
        exit_code = 1;
    }
    process::exit(exit_code);
}

fn init_logging() {
    let mut builder = env_logger::Builder::new();
    match env::var("RUST_LOG") {
        Ok(filter) => {
            builder.parse_filters(&filter);
        }
        Err(_) => {
            builder.filter_level(log::LevelFilter::Warn);
        }
    }
    builder.init();
}

fn parse_args(args: impl Iterator<Item = String>) -> Option<Options> {
    let mut options = Options {
        emit: false,
        dump: false,
        inputs: Vec::new(),
    };
    for arg in args {
        match arg.as_str() {
            "--emit" => options.emit = true,
            "--dump" => options.dump = true,
            "-h" | "--help" => return None,
            flag if flag.starts_with("--") => {
                eprintln!("Unknown option: {}", flag);
                return None;
            }
            _ => options.inputs.push(arg),
        }
    }
    if options.inputs.is_empty() {
        None
    } else {
        Some(options)
    }
}

fn print_usage() {
    eprintln!("Usage: instance-check [--emit] [--dump] <file.xml|manifest.yaml>...");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --emit   print each instance saved back to XML after styling");
    eprintln!("  --dump   print each instance tree as YAML");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  instance-check MainWindow.xml");
    eprintln!("  instance-check styles.xml *.xml");
    eprintln!("  instance-check --emit resources.yaml");
}

fn is_manifest(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Register style documents right away and queue instance documents.
/// A loose `<Styles>` file is registered as `file://<path>`.
fn collect_input(
    input: &str,
    store: &mut ResourceStore,
    pending: &mut Vec<PendingInstance>,
    diagnostics: &mut Diagnostics,
) -> Result<(), InstanceError> {
    let path = Path::new(input);
    if is_manifest(path) {
        let manifest = Manifest::load(path)?;
        for entry in &manifest.styles {
            let resource = entry.path.display().to_string();
            let text = fs::read_to_string(&entry.path)?;
            let styles = parse_styles(&resource, &text, diagnostics)?;
            if !store.insert(&entry.uri, Resource::Styles(styles)) {
                diagnostics.push(Diagnostic::new(
                    input,
                    TextPos::default(),
                    format!("Invalid resource URL \"{}\" for {}.", entry.uri, resource),
                ));
            }
        }
        for entry in &manifest.instances {
            pending.push(PendingInstance {
                resource: entry.path.display().to_string(),
                text: fs::read_to_string(&entry.path)?,
            });
        }
        return Ok(());
    }

    let text = fs::read_to_string(path)?;
    let doc = parse_xml(&text)?;
    if doc.root.name == "Styles" {
        let styles =
            InstanceStyleContext::load_from_xml(input, &doc, &DefaultNameClassifier, diagnostics);
        store.insert(&format!("file://{}", input), Resource::Styles(styles));
    } else {
        pending.push(PendingInstance {
            resource: input.to_string(),
            text,
        });
    }
    Ok(())
}

fn check_instance(
    instance: &PendingInstance,
    store: &ResourceStore,
    options: &Options,
    diagnostics: &mut Diagnostics,
) -> Result<(), InstanceError> {
    let Some(mut context) = parse_instance(&instance.resource, &instance.text, diagnostics)? else {
        return Ok(());
    };
    context.apply_styles(&instance.resource, store, diagnostics);

    if options.emit {
        println!("{}", context.save_to_xml().to_xml_string()?);
    }
    if options.dump {
        println!("{}", serde_yaml::to_string(&context)?);
    }
    Ok(())
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    eprintln!("{} diagnostic(s):", diagnostics.len());
    for diagnostic in diagnostics {
        eprintln!("  {}", diagnostic);
    }
}

fn print_error(error: &InstanceError) {
    match error {
        InstanceError::ParseError {
            line,
            column,
            message,
        } => {
            eprintln!("  Parse error at line {}, column {}:", line, column);
            eprintln!("    {}", message);
        }
        InstanceError::IoError(e) => {
            eprintln!("  Failed to read file:");
            eprintln!("    {}", e);
        }
        InstanceError::ManifestError(e) => {
            eprintln!("  Manifest error:");
            eprintln!("    {}", e);
        }
        InstanceError::EmptyDocument => {
            eprintln!("  Empty document: no root element found");
        }
        InstanceError::MultipleRootElements => {
            eprintln!("  Multiple root elements found");
            eprintln!("    A document must have exactly one root element");
        }
        e => {
            eprintln!("  {}", e);
        }
    }
}
