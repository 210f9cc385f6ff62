//! The ecFlow suite that runs retrieval and extraction once per day.

use std::{
    fmt,
    path::{Path, PathBuf},
    process::Command,
};

use tracing::info;

use crate::{config::Config, errors::DtExtractErr, exec};

mod repeat;
mod trigger;

pub use self::repeat::{cycle_timestamp, date_basher, DailyLoopFamily, RepeatDate};
pub use self::trigger::{Cmp, Operand, TimeGate, Trigger, TriggerEnv};

/// A task, the leaf of the suite tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    name: String,
    trigger: Option<Trigger>,
    variables: Vec<(String, String)>,
}

impl Task {
    /// A task without trigger or variables.
    pub fn new(name: &str) -> Self {
        Task {
            name: name.to_owned(),
            trigger: None,
            variables: vec![],
        }
    }

    /// Set the trigger.
    pub fn with_trigger(self, trigger: Trigger) -> Self {
        Task {
            trigger: Some(trigger),
            ..self
        }
    }

    /// Add a variable.
    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        self.variables.push((name.to_owned(), value.to_owned()));
        self
    }

    /// The task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The trigger, if any.
    pub fn trigger(&self) -> Option<&Trigger> {
        self.trigger.as_ref()
    }
}

/// A family of tasks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Family {
    name: String,
    repeat: Option<RepeatDate>,
    variables: Vec<(String, String)>,
    tasks: Vec<Task>,
}

impl Family {
    /// An empty family.
    pub fn new(name: &str) -> Self {
        Family {
            name: name.to_owned(),
            repeat: None,
            variables: vec![],
            tasks: vec![],
        }
    }

    /// Repeat the family over a range of dates.
    pub fn with_repeat(self, repeat: RepeatDate) -> Self {
        Family {
            repeat: Some(repeat),
            ..self
        }
    }

    /// Add a variable.
    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        self.variables.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Add a task. Tasks keep the order they were added in.
    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// The family name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The date repeat, if any.
    pub fn repeat(&self) -> Option<&RepeatDate> {
        self.repeat.as_ref()
    }

    /// Look up a variable defined on this family.
    pub fn variable(&self, name: &str) -> Option<&str> {
        lookup(&self.variables, name)
    }

    /// Find a task by name.
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.name == name)
    }

    /// All tasks.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}

/// The top level node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Suite {
    name: String,
    variables: Vec<(String, String)>,
    families: Vec<Family>,
}

impl Suite {
    /// An empty suite.
    pub fn new(name: &str) -> Self {
        Suite {
            name: name.to_owned(),
            variables: vec![],
            families: vec![],
        }
    }

    /// Add a variable.
    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        self.variables.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Add a family.
    pub fn with_family(mut self, family: Family) -> Self {
        self.families.push(family);
        self
    }

    /// The suite name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a variable defined on the suite.
    pub fn variable(&self, name: &str) -> Option<&str> {
        lookup(&self.variables, name)
    }

    /// Find a family by name.
    pub fn family(&self, name: &str) -> Option<&Family> {
        self.families.iter().find(|family| family.name == name)
    }
}

fn lookup<'a>(variables: &'a [(String, String)], name: &str) -> Option<&'a str> {
    variables
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn write_variables(
    f: &mut fmt::Formatter,
    indent: &str,
    variables: &[(String, String)],
) -> fmt::Result {
    for (name, value) in variables {
        if value.contains('\'') {
            writeln!(f, "{}edit {} \"{}\"", indent, name, value)?;
        } else {
            writeln!(f, "{}edit {} '{}'", indent, name, value)?;
        }
    }
    Ok(())
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "    task {}", self.name)?;
        write_variables(f, "      ", &self.variables)?;
        if let Some(ref trigger) = self.trigger {
            writeln!(f, "      trigger {}", trigger)?;
        }
        Ok(())
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "  family {}", self.name)?;
        if let Some(ref repeat) = self.repeat {
            writeln!(f, "    {}", repeat)?;
        }
        write_variables(f, "    ", &self.variables)?;
        for task in &self.tasks {
            write!(f, "{}", task)?;
        }
        writeln!(f, "  endfamily")
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "suite {}", self.name)?;
        write_variables(f, "  ", &self.variables)?;
        for family in &self.families {
            write!(f, "{}", family)?;
        }
        writeln!(f, "endsuite")
    }
}

/// The complete DT extraction suite: definition plus the job scripts of its tasks.
#[derive(Debug)]
pub struct DtExtractSuite {
    suite: Suite,
    scripts: Vec<(String, String)>,
    ecf_files: PathBuf,
    ecf_include: PathBuf,
    joboutdir: PathBuf,
    ecf_host: Option<String>,
    ecf_port: Option<u16>,
    unix_group: Option<String>,
}

impl DtExtractSuite {
    /// Name of the daily loop family.
    pub const FAMILY: &'static str = "DT_loop";
    /// Name of the retrieval task.
    pub const RETRIEVE_TASK: &'static str = "RetrieveDT";
    /// Name of the extraction task.
    pub const EXTRACT_TASK: &'static str = "ExtractDT";

    const DEFAULT_TEMPLATE: &'static str = include_str!("suite/default.ecf");
    const HEAD_H: &'static str = include_str!("suite/head.h");
    const TAIL_H: &'static str = include_str!("suite/tail.h");

    /// Assemble the suite. `config_path` is handed to the tasks so they read the same file.
    pub fn new(config: &Config, config_path: &Path) -> Result<Self, DtExtractErr> {
        let scheduler = &config.scheduler;
        let (start, end) = config.loop_range()?;

        let ecf_home = config.path(scheduler.ecf_home.as_deref().unwrap_or("ecf"))?;
        let ecf_files = match scheduler.ecf_files {
            Some(ref template) => config.path(template)?,
            None => ecf_home.join(&config.general.case),
        };
        let ecf_include = match scheduler.ecf_include {
            Some(ref template) => config.path(template)?,
            None => ecf_files.clone(),
        };
        let joboutdir = match scheduler.joboutdir {
            Some(ref template) => config.path(template)?,
            None => ecf_home.join("jobout"),
        };
        let dtrun = scheduler.dtrun.as_deref().unwrap_or("dtrun");

        let template = match scheduler.input_template {
            Some(ref template) => std::fs::read_to_string(config.path(template)?)?,
            None => Self::DEFAULT_TEMPLATE.to_owned(),
        };

        let day_family = DailyLoopFamily::new(Self::FAMILY, start.date(), end.date());

        // The delay is a time condition, so it goes on the task rather than the family, which
        // only waits on other nodes.
        let gate = TimeGate::new(config.delay()?, day_family.loop_variable());

        let family = day_family
            .build()?
            .with_task(Task::new(Self::RETRIEVE_TASK).with_trigger(gate.trigger()))
            .with_task(
                Task::new(Self::EXTRACT_TASK).with_trigger(Trigger::complete(Self::RETRIEVE_TASK)),
            );

        let suite = Suite::new(&config.general.case)
            .with_variable("ECF_HOME", &ecf_home.to_string_lossy())
            .with_variable("ECF_FILES", &ecf_files.to_string_lossy())
            .with_variable("ECF_INCLUDE", &ecf_include.to_string_lossy())
            .with_variable("ECF_OUT", &joboutdir.to_string_lossy())
            .with_variable("ECF_TRIES", &scheduler.ecfvars.ecf_tries.to_string())
            .with_variable("CONFIG", &config_path.to_string_lossy())
            .with_variable("DTRUN", dtrun)
            .with_family(family);

        let scripts = [
            (Self::RETRIEVE_TASK, "retrieve"),
            (Self::EXTRACT_TASK, "extract"),
        ]
        .iter()
        .map(|(task, action)| (task.to_string(), Self::job_script(&template, task, action)))
        .collect();

        Ok(DtExtractSuite {
            suite,
            scripts,
            ecf_files,
            ecf_include,
            joboutdir,
            ecf_host: scheduler.ecf_host.clone(),
            ecf_port: scheduler.ecf_port,
            unix_group: config.general.unix_group.clone(),
        })
    }

    fn job_script(template: &str, task: &str, action: &str) -> String {
        let command = format!(
            "%DTRUN% --config %CONFIG% --basetime \"%{}%\" {}",
            DailyLoopFamily::BASETIME_VARIABLE,
            action
        );

        template
            .replace("@TASK@", task)
            .replace("@COMMAND@", &command)
    }

    /// The suite definition.
    pub fn definition(&self) -> &Suite {
        &self.suite
    }

    /// Where the definition goes unless told otherwise: `<case>.def` next to the job scripts.
    pub fn default_def_file(&self) -> PathBuf {
        self.ecf_files.join(format!("{}.def", self.suite.name()))
    }

    /// The job script for a task.
    pub fn script(&self, task: &str) -> Option<&str> {
        lookup(&self.scripts, task)
    }

    /// Write the definition to `def_file`, the job scripts to `ECF_FILES` and create the job
    /// output directory. Include files are only written where none exist yet.
    pub fn write(&self, def_file: &Path) -> Result<(), DtExtractErr> {
        exec::make_dirs(&self.joboutdir, self.unix_group.as_deref())?;
        std::fs::create_dir_all(&self.ecf_files)?;
        std::fs::create_dir_all(&self.ecf_include)?;

        for (task, script) in &self.scripts {
            let path = self.ecf_files.join(format!("{}.ecf", task));
            info!("writing job script {}", path.display());
            std::fs::write(path, script)?;
        }

        for (name, contents) in &[("head.h", Self::HEAD_H), ("tail.h", Self::TAIL_H)] {
            let path = self.ecf_include.join(name);
            if !path.exists() {
                info!("writing include file {}", path.display());
                std::fs::write(path, contents)?;
            }
        }

        if let Some(parent) = def_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("writing suite definition {}", def_file.display());
        std::fs::write(def_file, self.suite.to_string())?;

        Ok(())
    }

    /// Load a written definition into the ecFlow server and begin the suite. With `replace` an
    /// existing suite of the same name is replaced.
    pub fn load(&self, def_file: &Path, replace: bool) -> Result<(), DtExtractErr> {
        let client = || {
            let mut cmd = Command::new("ecflow_client");
            if let Some(ref host) = self.ecf_host {
                cmd.env("ECF_HOST", host);
            }
            if let Some(port) = self.ecf_port {
                cmd.env("ECF_PORT", port.to_string());
            }
            cmd
        };

        let mut load = client();
        if replace {
            load.arg(format!("--replace=/{}", self.suite.name()))
                .arg(def_file);
        } else {
            load.arg(format!("--load={}", def_file.display()));
        }
        exec::run(&mut load)?;

        exec::run(client().arg(format!("--begin={}", self.suite.name())))
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
