use crate::context::ContextStack;
use crate::dir::{Directory, Exists, ManagedStream, Mode};
use crate::error::{Error, ReentrancyError, Result};
use crate::file::{LogFile, OpenRequest};
use crate::log::Log;
use crate::post_mortem::PostMortem;
use crate::{rank, Level};
use sha1::{Digest, Sha1};
use std::cell::RefCell;
use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

const FAVICON_PNG: &[u8] = include_bytes!("../../assets/favicon.png");
const VIEWER_CSS: &[u8] = include_bytes!("../../assets/viewer.css");
const VIEWER_JS: &[u8] = include_bytes!("../../assets/viewer.js");

/// A [`Log`] that writes a nested HTML document, `log.html`, to an output
/// directory.
///
/// Every context becomes a collapsible block and every message an item
/// tagged with its level. The document links a small viewer script and
/// stylesheet, which are stored next to it under content-addressed names so
/// that runs sharing a directory share a single copy. An existing `log.html`
/// is never overwritten; the new document gets the next free name instead.
///
/// Only the primary rank writes.
#[derive(Debug)]
pub struct HtmlLog {
    outdir: PathBuf,
    title: String,
    scriptname: Option<String>,
    funcname: Option<String>,
    funcargs: Vec<FuncArg>,
    state: RefCell<Option<State>>,
    stack: RefCell<ContextStack>,
}

/// Configures an [`HtmlLog`].
#[derive(Debug)]
pub struct HtmlBuilder {
    outdir: PathBuf,
    title: String,
    scriptname: Option<String>,
    funcname: Option<String>,
    funcargs: Vec<FuncArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FuncArg {
    name: String,
    value: String,
    annotation: Option<String>,
}

#[derive(Debug)]
struct State {
    dir: Directory,
    file: ManagedStream,
}

impl HtmlLog {
    /// Writes to `outdir` with the default document title.
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        HtmlLog::builder(outdir).build()
    }

    pub fn builder(outdir: impl Into<PathBuf>) -> HtmlBuilder {
        HtmlBuilder {
            outdir: outdir.into(),
            title: "treelog".to_owned(),
            scriptname: None,
            funcname: None,
            funcargs: Vec::new(),
        }
    }

    /// The name `log.html` was created under, while the log is active.
    pub fn filename(&self) -> Option<String> {
        self.state
            .borrow()
            .as_ref()
            .map(|state| state.file.name().to_owned())
    }

    fn print(&self, line: &str, flush: bool) -> Result<()> {
        if let Some(state) = &mut *self.state.borrow_mut() {
            writeln!(state.file, "{}", line)?;
            if flush {
                state.file.flush()?;
            }
        }
        Ok(())
    }

    fn print_item(&self, level: Level, markup: &str) -> Result<()> {
        if !rank::is_primary() {
            return Ok(());
        }
        self.stack.borrow_mut().materialize(|title| {
            self.print(
                &format!(
                    r#"<div class="context"><div class="title">{}</div><div class="children">"#,
                    escape(title)
                ),
                true,
            )
        })?;
        self.print(
            &format!(
                r#"<div class="item" data-loglevel="{}">{}</div>"#,
                level.index(),
                markup
            ),
            true,
        )
    }

    fn header(&self, dir: &Directory) -> Result<String> {
        let favicon = copy_asset(dir, FAVICON_PNG, "png")?;
        let css = copy_asset(dir, VIEWER_CSS, "css")?;
        let js = copy_asset(dir, VIEWER_JS, "js")?;

        let mut header = String::new();
        header.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
        header.push_str("<meta charset=\"UTF-8\"/>\n");
        header.push_str(
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1, \
             maximum-scale=1, minimum-scale=1, user-scalable=no\"/>\n",
        );
        let _ = writeln!(header, "<title>{}</title>", escape(&self.title));
        let _ = writeln!(header, "<script src=\"{}\"></script>", js);
        let _ = writeln!(
            header,
            "<link rel=\"stylesheet\" type=\"text/css\" href=\"{}\"/>",
            css
        );
        let _ = writeln!(
            header,
            "<link rel=\"icon\" sizes=\"48x48\" type=\"image/png\" href=\"{}\"/>",
            favicon
        );
        header.push_str("</head>\n<body");
        if let Some(scriptname) = &self.scriptname {
            let _ = write!(
                header,
                " data-scriptname=\"{}\" data-latest=\"../../../../log.html\"",
                escape(scriptname)
            );
        }
        if let Some(funcname) = &self.funcname {
            let _ = write!(header, " data-funcname=\"{}\"", escape(funcname));
        }
        header.push_str(">\n<div id=\"log\">");

        if !self.funcargs.is_empty() {
            header.push_str("\n<ul class=\"cmdline\">");
            for arg in &self.funcargs {
                let _ = match &arg.annotation {
                    Some(annotation) => write!(
                        header,
                        "\n<li>{}={}<span class=\"annotation\">{}</span></li>",
                        escape(&arg.name),
                        escape(&arg.value),
                        escape(annotation)
                    ),
                    None => write!(
                        header,
                        "\n<li>{}={}</li>",
                        escape(&arg.name),
                        escape(&arg.value)
                    ),
                };
            }
            header.push_str("\n</ul>");
        }
        Ok(header)
    }
}

impl HtmlBuilder {
    /// Sets the document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Records the name of the script that produced the log. This also links
    /// the document to the most recent log of the script.
    pub fn with_scriptname(mut self, scriptname: impl Into<String>) -> Self {
        self.scriptname = Some(scriptname.into());
        self
    }

    pub fn with_funcname(mut self, funcname: impl Into<String>) -> Self {
        self.funcname = Some(funcname.into());
        self
    }

    /// Adds an argument to the command line listing at the top of the
    /// document.
    pub fn with_funcarg(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        annotation: Option<&str>,
    ) -> Self {
        self.funcargs.push(FuncArg {
            name: name.into(),
            value: value.into(),
            annotation: annotation.map(str::to_owned),
        });
        self
    }

    pub fn build(self) -> HtmlLog {
        HtmlLog {
            outdir: self.outdir,
            title: self.title,
            scriptname: self.scriptname,
            funcname: self.funcname,
            funcargs: self.funcargs,
            state: RefCell::new(None),
            stack: RefCell::new(ContextStack::new()),
        }
    }
}

impl Log for HtmlLog {
    fn enter(&self, _previous: Rc<dyn Log>) -> Result<()> {
        if self.state.borrow().is_some() {
            return Err(ReentrancyError("HtmlLog").into());
        }

        let dir = Directory::acquire(&self.outdir)?;
        let header = self.header(&dir)?;
        let mut file = dir.open_managed("log.html", Mode::Text, Exists::Rename)?;
        tracing::debug!(target: "treelog", file = file.name(), "writing html log");
        writeln!(file, "{}", header)?;
        file.flush()?;

        // The log only counts as entered once everything above succeeded.
        *self.state.borrow_mut() = Some(State { dir, file });
        Ok(())
    }

    fn exit(&self) -> Result<()> {
        let footer = self.print("</div></body></html>", true);
        self.state.borrow_mut().take();
        footer
    }

    fn push_context(&self, title: &str, _may_skip: bool) -> Result<()> {
        self.stack.borrow_mut().push(title);
        Ok(())
    }

    fn pop_context(&self) -> Result<()> {
        self.stack
            .borrow_mut()
            .pop(|| self.print(r#"</div><div class="end"></div></div>"#, true))?;
        Ok(())
    }

    fn write(&self, level: Level, text: &str) -> Result<()> {
        self.print_item(level, &escape(text))
    }

    fn open(&self, filename: &str, mode: Mode, level: Level, exists: Exists) -> Result<LogFile> {
        let request = OpenRequest {
            filename: filename.to_owned(),
            mode,
            level,
            exists,
        };
        if !rank::is_primary() {
            return Ok(LogFile::null(request));
        }
        match &*self.state.borrow() {
            Some(state) => {
                let stream = state.dir.open_managed(filename, mode, exists)?;
                Ok(LogFile::disk(request, stream))
            }
            None => Ok(LogFile::null(request)),
        }
    }

    fn close(&self, mut file: LogFile) -> Result<()> {
        file.flush()?;
        let link = format!(
            r#"<a href="{}">{}</a>"#,
            quote(file.name()),
            escape(&file.request().filename)
        );
        let level = file.request().level;
        drop(file);
        self.print_item(level, &link)
    }

    fn write_post_mortem(&self, post_mortem: &PostMortem) -> Result<()> {
        self.write(Level::Error, &post_mortem.to_string())?;
        if !rank::is_primary() {
            return Ok(());
        }

        self.print(r#"<div class="post-mortem">"#, false)?;
        self.print("EXHAUSTIVE STACK TRACE", false)?;
        self.print("", false)?;
        for frame in post_mortem.frames() {
            self.print(&escape(&frame.to_string()), false)?;
            self.print("", false)?;
        }
        self.print("</div>", true)
    }
}

// Stores an embedded asset under the hex digest of its contents. Existing
// copies are left alone.
fn copy_asset(dir: &Directory, data: &[u8], ext: &str) -> Result<String, Error> {
    let name = format!("{:x}.{}", Sha1::digest(data), ext);
    let mut stream = dir.open_managed(&name, Mode::Binary, Exists::Skip)?;
    if stream.is_real() {
        stream.write_all(data)?;
        stream.flush()?;
    }
    Ok(stream.name().to_owned())
}

/// Escapes the HTML special characters, quotes included.
pub(crate) fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Percent-encodes a relative path for use in an `href`.
pub(crate) fn quote(path: &str) -> String {
    let mut quoted = String::with_capacity(path.len());
    for &b in path.as_bytes() {
        if b.is_ascii_alphanumeric() || b"/_.-~".contains(&b) {
            quoted.push(b as char);
        } else {
            let _ = write!(quoted, "%{:02X}", b);
        }
    }
    quoted
}

#[cfg(test)]
mod tests {
    use super::{escape, quote};

    #[test]
    fn test_escape() {
        assert!(escape(r#"<a href="x">'&'</a>"#) == "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;");
        assert!(escape("plain") == "plain");
    }

    #[test]
    fn test_quote() {
        assert!(quote("out-1.txt") == "out-1.txt");
        assert!(quote("plots/a b.png") == "plots/a%20b.png");
        assert!(quote("ü") == "%C3%BC");
    }
}
