use std::fs;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use treelog::dir::{Directory, Exists, Mode};
use treelog::log::{DataLog, HtmlLog, IndentLog, LogExt};
use treelog::{Error, Level, Log};

#[test]
fn test_rename_policy() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    fs::write(tmp.path().join("out.txt"), "original")?;
    let dir = Directory::acquire(tmp.path())?;

    let first = dir.open_managed("out.txt", Mode::Text, Exists::Rename)?;
    let second = dir.open_managed("out.txt", Mode::Text, Exists::Rename)?;

    assert!(first.name() == "out-1.txt");
    assert!(second.name() == "out-2.txt");
    assert!(tmp.path().join("out-1.txt").exists());
    assert!(fs::read_to_string(tmp.path().join("out.txt"))? == "original");

    Ok(())
}

#[test]
fn test_rename_keeps_existing_files() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    fs::write(tmp.path().join("out.txt"), "original")?;
    fs::write(tmp.path().join("out-1.txt"), "renamed before")?;
    let dir = Directory::acquire(tmp.path())?;

    let mut file = dir.open_managed("out.txt", Mode::Text, Exists::Rename)?;
    file.write_all(b"third")?;
    drop(file);

    assert!(fs::read_to_string(tmp.path().join("out.txt"))? == "original");
    assert!(fs::read_to_string(tmp.path().join("out-1.txt"))? == "renamed before");
    assert!(fs::read_to_string(tmp.path().join("out-2.txt"))? == "third");

    Ok(())
}

#[test]
fn test_skip_policy() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    fs::write(tmp.path().join("out.txt"), "original")?;
    let dir = Directory::acquire(tmp.path())?;

    let mut skipped = dir.open_managed("out.txt", Mode::Binary, Exists::Skip)?;
    assert!(!skipped.is_real());
    skipped.write_all(&[0; 100])?;
    skipped.flush()?;
    drop(skipped);
    assert!(fs::metadata(tmp.path().join("out.txt"))?.len() == 8);

    let fresh = dir.open_managed("new.txt", Mode::Binary, Exists::Skip)?;
    assert!(fresh.is_real());

    Ok(())
}

#[test]
fn test_overwrite_policy() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    fs::write(tmp.path().join("out.txt"), "original")?;
    let dir = Directory::acquire(tmp.path())?;

    let mut file = dir.open_managed("out.txt", Mode::Text, Exists::Overwrite)?;
    file.write_all(b"new")?;
    drop(file);

    assert!(fs::read_to_string(tmp.path().join("out.txt"))? == "new");

    Ok(())
}

#[test]
fn test_invalid_arguments() {
    assert!("w".parse::<Mode>() == Ok(Mode::Text));
    assert!("wb".parse::<Mode>() == Ok(Mode::Binary));
    assert!("skip".parse::<Exists>() == Ok(Exists::Skip));

    let err = "r".parse::<Mode>().unwrap_err();
    assert!(err.kind() == "mode");
    let err = "clobber".parse::<Exists>().unwrap_err();
    assert!(err.kind() == "exists");
    assert!(matches!(Error::from(err), Error::InvalidArgument(_)));
}

#[test]
fn test_data_log() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let log = Rc::new(DataLog::new(tmp.path().join("data")));
    let _active = treelog::activate(log)?;

    let _ctx = treelog::context("ignored")?;
    treelog::write(Level::Error, "ignored")?;

    for _ in 0..2 {
        let mut file = treelog::open("matrix.bin", Mode::Binary, Level::Info, Exists::Rename)?;
        file.write_all(&[1, 2, 3])?;
    }

    let mut names: Vec<String> = fs::read_dir(tmp.path().join("data"))?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    names.sort();
    assert!(names == ["matrix-1.bin", "matrix.bin"]);
    assert!(fs::read(tmp.path().join("data").join("matrix-1.bin"))? == [1, 2, 3]);

    Ok(())
}

#[test]
fn test_html_log() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let log = Rc::new(
        HtmlLog::builder(tmp.path())
            .with_title("poisson <2d>")
            .with_scriptname("poisson")
            .with_funcname("main")
            .with_funcarg("nelems", "8", None)
            .with_funcarg("degree", "2", Some("int"))
            .build(),
    );

    {
        let _active = treelog::activate(log.clone())?;
        assert!(log.filename().as_deref() == Some("log.html"));

        treelog::context("empty")?.close()?;
        let _solve = treelog::context("solve")?;
        treelog::write(Level::Warning, "a < b")?;
        let mut file = treelog::open("sol.csv", Mode::Text, Level::User, Exists::Overwrite)?;
        writeln!(file, "1,2")?;
    }

    let html = fs::read_to_string(tmp.path().join("log.html"))?;
    assert!(html.starts_with("<!DOCTYPE html>\n<html>\n<head>\n"));
    assert!(html.contains("<title>poisson &lt;2d&gt;</title>"));
    assert!(html.contains(
        r#"<body data-scriptname="poisson" data-latest="../../../../log.html" data-funcname="main">"#
    ));
    assert!(html.contains("<li>nelems=8</li>"));
    assert!(html.contains(r#"<li>degree=2<span class="annotation">int</span></li>"#));
    assert!(!html.contains("empty"));
    assert!(html.contains(
        r#"<div class="context"><div class="title">solve</div><div class="children">
<div class="item" data-loglevel="1">a &lt; b</div>
<div class="item" data-loglevel="2"><a href="sol.csv">sol.csv</a></div>
</div><div class="end"></div></div>
</div></body></html>
"#
    ));
    assert!(fs::read_to_string(tmp.path().join("sol.csv"))? == "1,2\n");

    // Assets are stored under their digest and shared between runs.
    let assets = fs::read_dir(tmp.path())?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.ends_with(".js") || name.ends_with(".css") || name.ends_with(".png")
        })
        .count();
    assert!(assets == 3);

    {
        let _active = treelog::activate(log.clone())?;
        assert!(log.filename().as_deref() == Some("log-1.html"));
    }
    assert!(fs::read_dir(tmp.path())?.count() == 3 + 3);

    Ok(())
}

#[test]
fn test_html_post_mortem() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let log = Rc::new(HtmlLog::new(tmp.path()));

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let activation = treelog::activate(log.clone()).unwrap();
        activation.in_closure(|| panic!("singular <matrix>"));
    }));
    assert!(result.is_err());

    let html = fs::read_to_string(tmp.path().join("log.html"))?;
    assert!(html.contains("panicked: singular &lt;matrix&gt;"));
    assert!(html.contains("<div class=\"post-mortem\">\nEXHAUSTIVE STACK TRACE\n"));
    assert!(html.ends_with("</div>\n</div></body></html>\n"));

    Ok(())
}

#[test]
#[cfg(target_os = "linux")]
fn test_failed_html_activation_can_be_retried() {
    // The directory exists, but procfs refuses to create files in it.
    let log = Rc::new(HtmlLog::new("/proc/self"));

    for _ in 0..2 {
        let err = treelog::activate(log.clone()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
    assert!(log.filename().is_none());
}

#[test]
fn test_indent_log() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let log = Rc::new(IndentLog::new(tmp.path()));
    let _active = treelog::activate(log.clone())?;

    {
        let _solve = log.context("solve\n", false)?;
        let _iter = log.context("iter 1", true)?;
        log.write(Level::Info, "residual <1e-3>")?;
        log.write(Level::Warning, "not converged\ncontinuing anyway")?;
    }
    log.write(Level::User, "done")?;

    let text = fs::read_to_string(tmp.path().join("log.html"))?;
    assert!(
        text == "c solve\n c iter 1\n  i residual &lt;1e-3&gt;\n  w not converged\n  | continuing anyway\nu done\n"
    );

    let progress: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join("progress.json"))?)?;
    assert!(progress["logpos"] == text.len());
    assert!(progress["context"] == serde_json::json!([]));
    assert!(progress["text"] == "done");
    assert!(progress["level"] == "user");

    Ok(())
}

#[test]
fn test_indent_progress_on_push() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let log = Rc::new(IndentLog::new(tmp.path()));
    let _active = treelog::activate(log.clone())?;

    let _outer = log.context("outer", false)?;
    let progress = fs::read_to_string(tmp.path().join("progress.json"))?;
    assert!(progress == "{\"logpos\":0,\"context\":[\"outer\"],\"text\":null,\"level\":null}\n");

    // Within the progress interval, pushes leave the progress file alone.
    let _inner = log.context("inner", false)?;
    assert!(fs::read_to_string(tmp.path().join("progress.json"))? == progress);

    Ok(())
}

#[test]
fn test_reactivating_file_logs() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let log = Rc::new(IndentLog::new(tmp.path()));

    let _active = treelog::activate(log.clone())?;
    let err = treelog::activate(log.clone()).unwrap_err();
    assert!(matches!(err, Error::Reentrancy(_)));

    Ok(())
}
