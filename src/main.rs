use std::fs;
use std::path::Path;
use std::process::{Command, ExitCode};

use chrono::Local;
use clap::{CommandFactory, Parser, Subcommand};
use comfy_table::{Attribute, Cell, CellAlignment, Table};
use inquire::{Confirm, DateSelect, InquireError, Select, Text};
use tracing_subscriber::EnvFilter;

use gst_bill::calc::parse_number;
use gst_bill::render::{format_date, format_inr, format_quantity, write_print_file};
use gst_bill::settings::{
    get_config_path, load_business_profile, load_settings, save_settings, AppSettings,
};
use gst_bill::{Bill, BillDraft, BillError, BillItem, BillStore, FileSlot, Result, SaveOutcome, Totals};

// ==========================================
// CLI
// ==========================================

#[derive(Parser)]
#[command(name = "gst-bill", version, about = "Create, keep and print GST bills")]
struct Cli {
    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new bill
    New,
    /// Edit an existing bill (id or bill number)
    Edit { bill: Option<String> },
    /// List all bills
    List,
    /// Show one bill
    View { bill: Option<String> },
    /// Write a print-ready page for a bill and open it
    Print { bill: Option<String> },
    /// Delete a bill after confirmation
    Delete { bill: Option<String> },
    /// Configure data directory
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(BillError::Prompt(InquireError::OperationCanceled))
        | Err(BillError::Prompt(InquireError::OperationInterrupted)) => {
            println!("Cancelled");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "gst_bill=debug" } else { "gst_bill=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config_path = get_config_path();
    if let Commands::Config = command {
        setup_config_wizard(&config_path)?;
        return Ok(());
    }

    let settings = match load_settings(&config_path)? {
        Some(settings) => settings,
        None => setup_config_wizard(&config_path)?,
    };
    let root = settings.root();
    fs::create_dir_all(&root)?;

    let mut store = BillStore::open_dir(&root);

    match command {
        Commands::New => create_bill(&mut store),
        Commands::Edit { bill } => edit_bill(&mut store, bill.as_deref()),
        Commands::List => {
            list_bills(&store);
            Ok(())
        }
        Commands::View { bill } => view_bill(&store, bill.as_deref()),
        Commands::Print { bill } => print_bill(&store, &root, bill.as_deref()),
        Commands::Delete { bill } => delete_bill(&mut store, bill.as_deref()),
        Commands::Config => Ok(()),
    }
}

// ==========================================
// 1. Create & Edit
// ==========================================

fn create_bill(store: &mut BillStore<FileSlot>) -> Result<()> {
    let draft = store.create_draft(Local::now().date_naive());
    println!("\n--- Creating Bill No. {} ---", draft.bill_no);

    let Some(draft) = fill_until_valid(draft)? else {
        println!("❌ Bill discarded.");
        return Ok(());
    };

    match store.save_draft(draft, None)? {
        SaveOutcome::Created(bill) => println!("✅ Bill No. {} saved.", bill.bill_no),
        other => tracing::warn!(?other, "unexpected outcome for a new bill"),
    }
    Ok(())
}

fn edit_bill(store: &mut BillStore<FileSlot>, reference: Option<&str>) -> Result<()> {
    let Some(bill) = resolve_bill(store, reference, "Select Bill to Edit:")? else {
        return Ok(());
    };
    println!("\n--- Editing Bill No. {} ---", bill.bill_no);

    let Some(draft) = fill_until_valid(BillDraft::from_bill(&bill))? else {
        println!("❌ Changes discarded.");
        return Ok(());
    };

    match store.save_draft(draft, Some(&bill.id))? {
        SaveOutcome::Updated(bill) => println!("✅ Bill No. {} updated.", bill.bill_no),
        SaveOutcome::NotFound => println!("⚠️  Bill No. {} no longer exists, nothing saved.", bill.bill_no),
        SaveOutcome::Created(_) => {}
    }
    Ok(())
}

/// Prompts for every field until the draft validates and the user confirms.
/// `None` means the user gave up.
fn fill_until_valid(mut draft: BillDraft) -> Result<Option<BillDraft>> {
    loop {
        fill_draft(&mut draft)?;

        let totals = draft.recompute();
        print_totals(&totals);

        if let Err(e) = draft.validate() {
            println!("❌ {}", e);
            if Confirm::new("Fix the bill?").with_default(true).prompt()? {
                continue;
            }
            return Ok(None);
        }

        if Confirm::new("Save bill?").with_default(true).prompt()? {
            return Ok(Some(draft));
        }
        if !Confirm::new("Make more changes?").with_default(true).prompt()? {
            return Ok(None);
        }
    }
}

fn fill_draft(draft: &mut BillDraft) -> Result<()> {
    draft.date = DateSelect::new("Bill Date:")
        .with_default(draft.date)
        .prompt()?;

    println!("\n--- Customer ---");
    draft.customer_name = Text::new("Name (Required):")
        .with_default(&draft.customer_name)
        .prompt()?;
    draft.customer_address = Text::new("Address:")
        .with_default(&draft.customer_address)
        .prompt()?;
    draft.customer_gstin = Text::new("GSTIN:")
        .with_default(&draft.customer_gstin)
        .prompt()?;
    draft.customer_state = Text::new("State:")
        .with_default(&draft.customer_state)
        .prompt()?;
    draft.state_code = Text::new("State Code:")
        .with_default(&draft.state_code)
        .prompt()?;

    enter_bill_items(draft)?;

    println!("\n--- Taxes (%) ---");
    draft.cgst_percent = Text::new("CGST %:").with_default(&draft.cgst_percent).prompt()?;
    draft.sgst_percent = Text::new("SGST %:").with_default(&draft.sgst_percent).prompt()?;
    draft.igst_percent = Text::new("IGST %:").with_default(&draft.igst_percent).prompt()?;
    Ok(())
}

const ROW_ACTIONS: [&str; 3] = ["Keep", "Edit", "Remove"];

/// Asks what to do with each existing row, then takes new rows until an
/// empty description.
fn enter_bill_items(draft: &mut BillDraft) -> Result<()> {
    println!("\n--- Items ---");

    let mut index = 0;
    while index < draft.items.len() {
        let item = &draft.items[index];
        if item.is_blank() {
            index += 1;
            continue;
        }
        let question = format!(
            "Item {}: {} ({} x {:.2} = ₹{})",
            index + 1,
            item.description,
            format_quantity(item.quantity),
            item.rate,
            format_inr(&item.amount)
        );
        let action = Select::new(&question, ROW_ACTIONS.to_vec()).prompt()?;
        match action {
            "Edit" => {
                let item = &mut draft.items[index];
                let desc = Text::new("Description:")
                    .with_default(&item.description)
                    .prompt()?;
                let (quantity, rate) = ask_quantity_and_rate(item.quantity, item.rate)?;
                *item = BillItem::new(desc, quantity, rate);
                index += 1;
            }
            "Remove" => {
                if !draft.remove_item(index) {
                    println!("⚠️  A bill needs at least one item, row kept.");
                    index += 1;
                }
            }
            _ => index += 1,
        }
    }

    loop {
        let desc = Text::new("New item description (leave empty to finish):").prompt()?;
        if desc.trim().is_empty() {
            break;
        }
        let (quantity, rate) = ask_quantity_and_rate(0.0, 0.0)?;
        let row = match draft.items.iter().position(BillItem::is_blank) {
            Some(row) => row,
            None => {
                draft.add_item();
                draft.items.len() - 1
            }
        };
        draft.items[row] = BillItem::new(desc, quantity, rate);
        println!("   = {}", format_inr(&draft.items[row].amount));
    }
    Ok(())
}

fn ask_quantity_and_rate(quantity: f64, rate: f64) -> Result<(f64, f64)> {
    let quantity = Text::new("Quantity:")
        .with_default(&format_quantity(quantity))
        .prompt()?;
    let rate = Text::new("Rate (₹):")
        .with_default(&format!("{:.2}", rate))
        .prompt()?;
    Ok((parse_number(&quantity), parse_number(&rate)))
}

// ==========================================
// 2. List & View
// ==========================================

fn list_bills(store: &BillStore<FileSlot>) {
    if store.bills().is_empty() {
        println!("(No bills yet. Create one with `gst-bill new`.)");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("Bill No"),
        Cell::new("Date"),
        Cell::new("Customer"),
        Cell::new("Amount (₹)"),
    ]);
    for bill in store.list() {
        table.add_row(vec![
            Cell::new(&bill.bill_no),
            Cell::new(format_date(bill.date)),
            Cell::new(&bill.customer_name),
            Cell::new(format_inr(&bill.total_amount)).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("\n--- Bills ({}) ---", store.bills().len());
    println!("{table}");
}

fn view_bill(store: &BillStore<FileSlot>, reference: Option<&str>) -> Result<()> {
    let Some(bill) = resolve_bill(store, reference, "Select Bill to View:")? else {
        return Ok(());
    };
    print_bill_details(&bill);
    Ok(())
}

fn print_bill_details(bill: &Bill) {
    println!("\n📄 Bill No. {}    Date: {}", bill.bill_no, format_date(bill.date));
    println!("   Customer: {}", bill.customer_name);
    for (label, value) in [
        ("Address", &bill.customer_address),
        ("GSTIN", &bill.customer_gstin),
        ("State", &bill.customer_state),
        ("State Code", &bill.state_code),
    ] {
        if !value.is_empty() {
            println!("   {}: {}", label, value);
        }
    }

    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("S.No."),
        Cell::new("Description"),
        Cell::new("Qty"),
        Cell::new("Rate"),
        Cell::new("Amount"),
    ]);
    for (index, item) in bill.items.iter().enumerate() {
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(&item.description),
            Cell::new(format_quantity(item.quantity)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", item.rate)).set_alignment(CellAlignment::Right),
            Cell::new(format_inr(&item.amount)).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");

    let mut totals = Table::new();
    for (label, amount) in [
        ("Net Amount".to_string(), &bill.net_amount),
        (format!("CGST @ {}%", bill.cgst_percent), &bill.cgst_amount),
        (format!("SGST @ {}%", bill.sgst_percent), &bill.sgst_amount),
        (format!("IGST @ {}%", bill.igst_percent), &bill.igst_amount),
    ] {
        totals.add_row(vec![
            Cell::new(label),
            Cell::new(format_inr(amount)).set_alignment(CellAlignment::Right),
        ]);
    }
    totals.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(format_inr(&bill.total_amount))
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Right),
    ]);
    println!("{totals}");
    println!("   {}", bill.amount_in_words);
}

fn print_totals(totals: &Totals) {
    let mut table = Table::new();
    table.set_header(vec![Cell::new("Net"), Cell::new("CGST"), Cell::new("SGST"), Cell::new("IGST"), Cell::new("Total")]);
    table.add_row(vec![
        Cell::new(format_inr(&totals.net_amount)),
        Cell::new(format_inr(&totals.cgst_amount)),
        Cell::new(format_inr(&totals.sgst_amount)),
        Cell::new(format_inr(&totals.igst_amount)),
        Cell::new(format_inr(&totals.total_amount)).add_attribute(Attribute::Bold),
    ]);
    println!("\n{table}");
    println!("   {}", totals.amount_in_words);
}

// ==========================================
// 3. Print & Delete
// ==========================================

fn print_bill(store: &BillStore<FileSlot>, root: &Path, reference: Option<&str>) -> Result<()> {
    let Some(bill) = resolve_bill(store, reference, "Select Bill to Print:")? else {
        return Ok(());
    };
    let business = load_business_profile(root)?;
    let path = write_print_file(root, &bill, &business)?;
    println!("✅ Print page written: {:?}", path);
    open_in_browser(&path);
    Ok(())
}

fn delete_bill(store: &mut BillStore<FileSlot>, reference: Option<&str>) -> Result<()> {
    let Some(bill) = resolve_bill(store, reference, "Select Bill to Delete:")? else {
        return Ok(());
    };

    let question = format!(
        "Delete Bill No. {} for {} (₹{})? This cannot be undone.",
        bill.bill_no,
        bill.customer_name,
        format_inr(&bill.total_amount)
    );
    if !Confirm::new(&question).with_default(false).prompt()? {
        println!("Cancelled");
        return Ok(());
    }

    if store.remove(&bill.id)? {
        println!("🗑️  Bill No. {} deleted.", bill.bill_no);
    } else {
        println!("⚠️  Bill No. {} was already gone.", bill.bill_no);
    }
    Ok(())
}

// ==========================================
// 4. Helpers
// ==========================================

/// Finds a bill by id or bill number, or lets the user pick one.
fn resolve_bill(
    store: &BillStore<FileSlot>,
    reference: Option<&str>,
    prompt: &str,
) -> Result<Option<Bill>> {
    if let Some(reference) = reference {
        return store
            .find(reference)
            .cloned()
            .map(Some)
            .ok_or_else(|| BillError::NotFound(reference.to_string()));
    }

    let bills: Vec<&Bill> = store.list().collect();
    if bills.is_empty() {
        println!("❌ No bills found.");
        return Ok(None);
    }

    let options: Vec<String> = bills
        .iter()
        .map(|b| {
            format!(
                "No. {} | {} | {} | ₹{}",
                b.bill_no,
                format_date(b.date),
                b.customer_name,
                format_inr(&b.total_amount)
            )
        })
        .collect();

    let choice = Select::new(prompt, options).with_page_size(10).raw_prompt()?;
    Ok(Some(bills[choice.index].clone()))
}

fn setup_config_wizard(config_path: &Path) -> Result<AppSettings> {
    println!("\n⚙️  --- Configuration Setup ---");
    let current = load_settings(config_path).ok().flatten().unwrap_or_default();

    let data_root = Text::new("Data Directory (bills and print pages go here):")
        .with_default(&current.data_root)
        .prompt()?;

    let settings = AppSettings { data_root };
    save_settings(config_path, &settings)?;
    println!("✅ Settings saved.");
    Ok(settings)
}

fn open_in_browser(path: &Path) {
    #[cfg(target_os = "macos")]
    Command::new("open").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer").arg(path).spawn().ok();

    #[cfg(target_os = "linux")]
    Command::new("xdg-open").arg(path).spawn().ok();
}
