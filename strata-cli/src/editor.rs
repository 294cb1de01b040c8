//! Interactive definition editor
//!
//! A nested shell over the draft model: the operator descends from the
//! pipeline into a package, repository or step (`add`, `select`), fills in
//! fields (`set key=value`), climbs back out (`end`) and finally commits.
//! The nesting is an explicit frame stack of indices into the draft; all
//! state lives in the [`DraftPipeline`], none in the shell.

use anyhow::{Result, anyhow, bail};
use colored::Colorize;

use strata_core::domain::pipeline::Pipeline;
use strata_core::draft::{DraftPackage, DraftPipeline, DraftRepo, DraftStep, Filter};

/// One parsed shell command.
#[derive(Debug)]
pub enum EditorCommand {
    Add { ty: String },
    Select { ty: String, filter: Option<Filter> },
    Set { key: String, value: String },
    Print,
    End,
    Commit,
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Parses one input line into a command.
pub fn parse_command(input: &str) -> Result<EditorCommand> {
    let input = input.trim();
    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    };

    match word {
        "end" => Ok(EditorCommand::End),
        "print" => Ok(EditorCommand::Print),
        "commit" => Ok(EditorCommand::Commit),
        "add" => {
            if rest.is_empty() {
                bail!("usage: add <package|repo|step>");
            }
            Ok(EditorCommand::Add {
                ty: rest.to_string(),
            })
        }
        "set" => {
            let (key, value) = parse_key_val(rest)?;
            Ok(EditorCommand::Set { key, value })
        }
        "select" => {
            let (ty, filter) = match rest.split_once(char::is_whitespace) {
                Some((ty, kv)) => {
                    let (key, value) = parse_key_val(kv.trim())?;
                    (ty, Some(Filter { key, value }))
                }
                None if !rest.is_empty() => (rest, None),
                None => bail!("usage: select <package|repo|step> [key=value]"),
            };
            Ok(EditorCommand::Select {
                ty: ty.to_string(),
                filter,
            })
        }
        _ => bail!("unrecognized command: {}", word),
    }
}

/// Where the operator currently is in the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Pipeline,
    Package(usize),
    Repo(usize),
    Step(usize),
}

/// What applying one command produced.
#[derive(Debug)]
pub enum EditorOutcome {
    Continue,
    /// `commit` passed validation; the caller owns what happens next.
    Committed(Pipeline),
}

/// The editing session
pub struct Editor {
    pub draft: DraftPipeline,
    stack: Vec<Frame>,
}

impl Editor {
    pub fn new(draft: DraftPipeline) -> Self {
        Self {
            draft,
            stack: vec![Frame::Pipeline],
        }
    }

    /// `stratacfg:pipeline:step(build)> `
    pub fn prompt(&self) -> String {
        let mut parts = vec!["stratacfg".to_string()];
        for frame in &self.stack {
            parts.push(format!("{}", self.frame_label(*frame).yellow()));
        }
        format!("{}> ", parts.join(":"))
    }

    fn frame_label(&self, frame: Frame) -> String {
        match frame {
            Frame::Pipeline => "pipeline".to_string(),
            Frame::Package(i) => self.draft.packages[i].label(),
            Frame::Repo(i) => self.draft.repos[i].label(),
            Frame::Step(i) => self.draft.steps[i].label(),
        }
    }

    fn top(&self) -> Frame {
        *self.stack.last().unwrap_or(&Frame::Pipeline)
    }

    pub fn apply(&mut self, command: EditorCommand) -> Result<EditorOutcome> {
        match command {
            EditorCommand::Add { ty } => self.add(&ty)?,
            EditorCommand::Select { ty, filter } => self.select(&ty, filter)?,
            EditorCommand::Set { key, value } => self.set(&key, value)?,
            EditorCommand::Print => println!("{:#?}", self.print_view()),
            EditorCommand::End => {
                if self.stack.len() == 1 {
                    println!("Nothing to end");
                } else {
                    self.stack.pop();
                }
            }
            EditorCommand::Commit => {
                let pipeline = self.draft.validate()?;
                return Ok(EditorOutcome::Committed(pipeline));
            }
        }
        Ok(EditorOutcome::Continue)
    }

    fn add(&mut self, ty: &str) -> Result<()> {
        if self.top() != Frame::Pipeline {
            bail!("`add` only works at the pipeline level; use `end` first");
        }
        let frame = match ty {
            "package" => {
                self.draft.packages.push(DraftPackage::default());
                Frame::Package(self.draft.packages.len() - 1)
            }
            "repo" => {
                self.draft.repos.push(DraftRepo::default());
                Frame::Repo(self.draft.repos.len() - 1)
            }
            "step" => {
                self.draft.steps.push(DraftStep::default());
                Frame::Step(self.draft.steps.len() - 1)
            }
            other => bail!("cannot add '{}': expected package, repo or step", other),
        };
        self.stack.push(frame);
        Ok(())
    }

    fn select(&mut self, ty: &str, filter: Option<Filter>) -> Result<()> {
        if self.top() != Frame::Pipeline {
            bail!("`select` only works at the pipeline level; use `end` first");
        }

        fn pick<T>(items: &[T], matches: impl Fn(&T) -> bool) -> Result<usize> {
            let matching: Vec<usize> = items
                .iter()
                .enumerate()
                .filter(|(_, item)| matches(item))
                .map(|(i, _)| i)
                .collect();
            match matching[..] {
                [one] => Ok(one),
                [] => bail!("No element matched the filter"),
                _ => bail!("More than one element matched the filter"),
            }
        }

        let frame = match ty {
            "package" => Frame::Package(pick(&self.draft.packages, |p| {
                filter.as_ref().is_none_or(|f| p.matches(f))
            })?),
            "repo" => Frame::Repo(pick(&self.draft.repos, |r| {
                filter.as_ref().is_none_or(|f| r.matches(f))
            })?),
            "step" => Frame::Step(pick(&self.draft.steps, |s| {
                filter.as_ref().is_none_or(|f| s.matches(f))
            })?),
            other => bail!("cannot select '{}': expected package, repo or step", other),
        };
        self.stack.push(frame);
        Ok(())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        match self.top() {
            Frame::Pipeline => self.draft.set(key, value)?,
            Frame::Package(i) => self.draft.packages[i].set(key, value)?,
            Frame::Repo(i) => self.draft.repos[i].set(key, value)?,
            Frame::Step(i) => self.draft.steps[i].set(key, value)?,
        }
        Ok(())
    }

    fn print_view(&self) -> PrintView<'_> {
        match self.top() {
            Frame::Pipeline => PrintView::Pipeline(&self.draft),
            Frame::Package(i) => PrintView::Package(&self.draft.packages[i]),
            Frame::Repo(i) => PrintView::Repo(&self.draft.repos[i]),
            Frame::Step(i) => PrintView::Step(&self.draft.steps[i]),
        }
    }
}

#[derive(Debug)]
enum PrintView<'a> {
    Pipeline(&'a DraftPipeline),
    Package(&'a DraftPackage),
    Repo(&'a DraftRepo),
    Step(&'a DraftStep),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_line(editor: &mut Editor, line: &str) -> Result<EditorOutcome> {
        editor.apply(parse_command(line)?)
    }

    #[test]
    fn test_parse_command_variants() {
        assert!(matches!(parse_command("end"), Ok(EditorCommand::End)));
        assert!(matches!(parse_command("commit"), Ok(EditorCommand::Commit)));
        assert!(matches!(
            parse_command("add step"),
            Ok(EditorCommand::Add { .. })
        ));
        assert!(matches!(
            parse_command("set name=build"),
            Ok(EditorCommand::Set { .. })
        ));
        assert!(matches!(
            parse_command("select step name=build"),
            Ok(EditorCommand::Select {
                filter: Some(_),
                ..
            })
        ));
        assert!(parse_command("frobnicate").is_err());
        assert!(parse_command("set nameonly").is_err());
    }

    #[test]
    fn test_build_a_pipeline_and_commit() {
        let mut editor = Editor::new(DraftPipeline::new("katarineko"));

        apply_line(&mut editor, "add step").unwrap();
        apply_line(&mut editor, "set name=build").unwrap();
        apply_line(&mut editor, "set script=katarineko/build.sh").unwrap();
        apply_line(&mut editor, "end").unwrap();

        apply_line(&mut editor, "add step").unwrap();
        apply_line(&mut editor, "set name=test").unwrap();
        apply_line(&mut editor, "set script=katarineko/test.sh").unwrap();
        apply_line(&mut editor, "set depends=build").unwrap();
        apply_line(&mut editor, "end").unwrap();

        match apply_line(&mut editor, "commit").unwrap() {
            EditorOutcome::Committed(pipeline) => {
                assert_eq!(pipeline.name, "katarineko");
                assert_eq!(pipeline.steps.len(), 2);
                assert_eq!(pipeline.steps[1].depends, vec!["build"]);
            }
            EditorOutcome::Continue => panic!("commit should validate"),
        }
    }

    #[test]
    fn test_commit_reports_incomplete_drafts() {
        let mut editor = Editor::new(DraftPipeline::new("katarineko"));
        apply_line(&mut editor, "add step").unwrap();
        apply_line(&mut editor, "set name=build").unwrap();
        apply_line(&mut editor, "end").unwrap();

        let err = apply_line(&mut editor, "commit").unwrap_err();
        assert!(err.to_string().contains("step script"));
    }

    #[test]
    fn test_select_requires_unambiguous_match() {
        let mut editor = Editor::new(DraftPipeline::new("katarineko"));
        for name in ["build", "test"] {
            apply_line(&mut editor, "add step").unwrap();
            apply_line(&mut editor, &format!("set name={}", name)).unwrap();
            apply_line(&mut editor, "end").unwrap();
        }

        assert!(apply_line(&mut editor, "select step").is_err());
        assert!(apply_line(&mut editor, "select step name=missing").is_err());

        apply_line(&mut editor, "select step name=test").unwrap();
        assert!(editor.prompt().contains("step(test)"));
    }

    #[test]
    fn test_add_below_pipeline_level_is_rejected() {
        let mut editor = Editor::new(DraftPipeline::new("katarineko"));
        apply_line(&mut editor, "add step").unwrap();
        assert!(apply_line(&mut editor, "add package").is_err());
    }

    #[test]
    fn test_end_at_root_stays_at_root() {
        let mut editor = Editor::new(DraftPipeline::new("katarineko"));
        apply_line(&mut editor, "end").unwrap();
        assert!(editor.prompt().starts_with("stratacfg:"));
        assert!(apply_line(&mut editor, "add repo").is_ok());
    }
}
