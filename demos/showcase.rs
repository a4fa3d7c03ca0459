use borealis_db::{
    Algorithm, Borealis, Conditions, Config, ConvertTarget, Result, SearchConditions, doc,
};

fn main() -> Result<()> {
    let root = std::env::temp_dir().join("borealis-showcase");
    let _ = std::fs::remove_dir_all(&root);

    let mut db = Borealis::open(Config::with_directory(root.join("plain")))?;
    println!("opened store at {}", root.join("plain").display());

    // Create a few documents; each gets an auto-assigned _id.
    for (name, age, token) in [("Ada", 36, "a-100"), ("Brian", 81, "b-200"), ("Grace", 85, "g-300")] {
        let receipt = db.create("people", doc! { "name" => name, "age" => age, "token" => token })?;
        println!("created {} -> id {:?}", name, receipt.id());
    }

    // Condition queries.
    let elders = db.find(
        "people",
        &Conditions::from_document(&doc! { "age" => doc! { "$gte" => 80 } })?,
    )?;
    println!("{} people aged 80+", elders.count());

    // Case-insensitive substring search.
    let hits = db.search(
        "people",
        &SearchConditions::from_document(&doc! { "name" => "gra" })?,
    )?;
    println!("search 'gra' matched {}", hits.count());

    // Shallow-merge edit.
    let modified = db.edit(
        "people",
        &Conditions::from_document(&doc! { "name" => "Ada" })?,
        &doc! { "age" => 37 },
    )?;
    println!("edited {} record(s)", modified);

    // Ordered dump via the token index.
    db.rebuild_index("people")?;
    for person in db.index_documents() {
        println!("  indexed: {}", person);
    }

    // Re-encrypt the whole directory in place.
    let key = Borealis::generate_key(16);
    let report = db.convert(
        &ConvertTarget::default(),
        &ConvertTarget {
            directory: Some(root.join("locked")),
            encryption: Some(Algorithm::Aes128Cbc),
            encryption_key: Some(key.clone()),
            ..ConvertTarget::default()
        },
        None,
    )?;
    println!("converted {} file(s) to encrypted storage", report.converted);

    let locked = Borealis::open(Config {
        encryption: Some(Algorithm::Aes128Cbc),
        encryption_key: Some(key),
        ..Config::with_directory(root.join("locked"))
    })?;
    println!("encrypted store holds {} people", locked.count("people")?);

    Ok(())
}
