use std::fs;
use std::io::{self, Write};
use std::rc::Rc;
use treelog::file::LogFile;
use treelog::log::{CaptureLog, Captured, ConsoleLog, DataLog, LogExt, TeeLog};
use treelog::writer::Buffer;
use treelog::{Error, Exists, Level, Log, Mode, Result};

// A log that accepts everything except the operations it is told to fail.
#[derive(Default)]
struct Failing {
    enter: bool,
    push: bool,
    write: bool,
}

fn broken(what: &str) -> Error {
    io::Error::new(io::ErrorKind::Other, format!("broken {}", what)).into()
}

impl Log for Failing {
    fn enter(&self, _previous: Rc<dyn Log>) -> Result<()> {
        if self.enter {
            return Err(broken("enter"));
        }
        Ok(())
    }

    fn exit(&self) -> Result<()> {
        Ok(())
    }

    fn push_context(&self, _title: &str, _may_skip: bool) -> Result<()> {
        if self.push {
            return Err(broken("push"));
        }
        Ok(())
    }

    fn pop_context(&self) -> Result<()> {
        Ok(())
    }

    fn write(&self, _level: Level, _text: &str) -> Result<()> {
        if self.write {
            return Err(broken("write"));
        }
        Ok(())
    }

    fn open(&self, _filename: &str, _mode: Mode, _level: Level, _exists: Exists) -> Result<LogFile> {
        Err(broken("open"))
    }

    fn close(&self, _file: LogFile) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_fan_out() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let first = Rc::new(CaptureLog::new());
    let second = Rc::new(CaptureLog::new());
    let tee = TeeLog::new(vec![first.clone(), second.clone()]);

    {
        let _ctx = tee.context("solve", false)?;
        tee.write(Level::Error, "boom")?;
    }

    assert!(first.events() == second.events());
    assert!(
        first.events()
            == [
                Captured::Push("solve".to_owned()),
                Captured::Item {
                    level: Level::Error,
                    text: "boom".to_owned(),
                    context: vec!["solve".to_owned()],
                },
                Captured::Pop,
            ]
    );

    Ok(())
}

#[test]
fn test_failed_push_is_rolled_back() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let capture = Rc::new(CaptureLog::new());
    let failing = Rc::new(Failing {
        push: true,
        ..Failing::default()
    });
    let tee = TeeLog::new(vec![capture.clone(), failing]);

    let err = tee.push_context("half", false).unwrap_err();
    assert!(matches!(err, Error::Io(_)));

    // The context was popped from the child that accepted it.
    tee.write(Level::Info, "outside")?;
    assert!(
        capture.events()
            == [Captured::Item {
                level: Level::Info,
                text: "outside".to_owned(),
                context: Vec::new(),
            }]
    );

    Ok(())
}

#[test]
fn test_errors_are_aggregated() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let capture = Rc::new(CaptureLog::new());
    let failing = || {
        Rc::new(Failing {
            write: true,
            ..Failing::default()
        })
    };
    let tee = TeeLog::new(vec![failing(), capture.clone(), failing()]);

    let err = tee.write(Level::User, "partial").unwrap_err();
    assert!(matches!(err, Error::Aggregate(ref errors) if errors.len() == 2));
    // Children that didn't fail still received the message.
    assert!(capture.items() == [(Level::User, "partial".to_owned())]);

    Ok(())
}

#[test]
fn test_failed_enter_is_rolled_back() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let capture = Rc::new(CaptureLog::new());
    let failing = Rc::new(Failing {
        enter: true,
        ..Failing::default()
    });
    let tee = Rc::new(TeeLog::new(vec![capture.clone(), failing]));

    assert!(treelog::activate(tee).is_err());
    // The capture log was exited again, so it can be activated on its own.
    let _active = treelog::activate(capture)?;

    Ok(())
}

#[test]
fn test_file_fan_out() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let capture = Rc::new(CaptureLog::new());
    let tee = Rc::new(TeeLog::new(vec![
        Rc::new(DataLog::new(tmp.path())),
        capture.clone(),
    ]));

    {
        let _active = treelog::activate(tee)?;
        let mut file = treelog::open("mesh.txt", Mode::Text, Level::User, Exists::Rename)?;
        assert!(file.is_real());
        assert!(file.name() == "mesh.txt");
        write!(file, "nodes 9")?;
    }

    assert!(fs::read_to_string(tmp.path().join("mesh.txt"))? == "nodes 9");
    assert!(capture.files() == [("mesh.txt".to_owned(), b"nodes 9".to_vec())]);
    assert!(capture.items() == [(Level::User, "mesh.txt".to_owned())]);

    Ok(())
}

#[test]
fn test_file_fan_out_without_real_children() -> std::result::Result<(), Box<dyn std::error::Error>>
{
    let buffer = Buffer::new();
    let console = || Rc::new(ConsoleLog::builder().with_writer(buffer.clone()).build());
    let tee = TeeLog::new(vec![console(), console()]);

    let file = tee.managed_file("skipped.png", Mode::Binary, Level::Info, Exists::Skip)?;
    assert!(!file.is_real());
    file.finish()?;
    assert!(buffer.contents() == "skipped.png\nskipped.png\n");

    Ok(())
}

#[test]
fn test_failed_open_closes_opened_files() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let capture = Rc::new(CaptureLog::new());
    let tee = TeeLog::new(vec![capture.clone(), Rc::new(Failing::default())]);

    let err = tee
        .open("never.txt", Mode::Text, Level::Info, Exists::Rename)
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    // The capture log got its handle back and reported it.
    assert!(capture.files() == [("never.txt".to_owned(), Vec::new())]);

    Ok(())
}

#[test]
fn test_close_rejects_foreign_files() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let capture = Rc::new(CaptureLog::new());
    let tee = TeeLog::new(vec![capture.clone()]);

    let file = capture.open("other.txt", Mode::Text, Level::Info, Exists::Rename)?;
    let err = tee.close(file).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(ref e) if e.kind() == "file" && e.value() == "other.txt"));
    // The handle never reached the child.
    assert!(capture.files().is_empty());

    Ok(())
}
