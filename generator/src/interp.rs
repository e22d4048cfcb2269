// interp.rs — Script execution against the generation engine
//
// Walks a parsed script in source order. `pins` items extend the pin table
// used by later patterns; each `pattern` runs on its own
// `SequenceController`; each `flow` on its own `FlowBuilder`; `instance`
// and `patset` items fill the two sheets, which are deduplicated and
// registered with the session once the whole script has run.
//
// Preconditions: the script parsed without errors.
// Postconditions: on success every pattern and flow is complete and every
//   generated name is registered with the session.
// Failure modes: the first fatal error aborts execution and is returned as
//   an `E0100` diagnostic carrying the statement's span; misuse of a
//   statement (unknown command, bad arguments) is `E0002`.
// Side effects: warnings are logged through `log::warn!`.

use crate::ast::{Arg, Command, Ident, ItemKind, NamedBlock, Script, Span};
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::error::GenError;
use crate::flow::sheet::{PatternSet, Sheet, TestInstance};
use crate::flow::{FinalizedFlow, FlowBuilder, FlowOp};
use crate::pin::{PinState, PinTable};
use crate::sequence::{CycleOptions, GeneratedPattern, GeneratorConfig, SequenceController};
use crate::session::GenerationSession;
use crate::threads::ThreadSet;
use crate::time::{Frequency, Time};

/// Everything a script generated.
#[derive(Debug)]
pub struct ExecOutput {
    pub patterns: Vec<GeneratedPattern>,
    pub flows: Vec<FinalizedFlow>,
    pub instances: Sheet<TestInstance>,
    pub patsets: Sheet<PatternSet>,
}

/// Result of execution: generated artifacts plus diagnostics. Artifacts are
/// partial when the diagnostics contain an error.
#[derive(Debug)]
pub struct ExecResult {
    pub output: ExecOutput,
    pub diagnostics: Vec<Diagnostic>,
}

/// Execute `script` under `config`.
pub fn execute(script: &Script, config: &GeneratorConfig) -> ExecResult {
    let mut interp = Interp {
        config,
        pins: PinTable::new(),
        session: GenerationSession::new(),
        output: ExecOutput {
            patterns: Vec::new(),
            flows: Vec::new(),
            instances: Sheet::new("instances"),
            patsets: Sheet::new("patsets"),
        },
        diagnostics: Vec::new(),
    };
    if let Err(diag) = interp.run(script) {
        interp.diagnostics.push(diag);
    }
    let Interp {
        output,
        mut diagnostics,
        session,
        ..
    } = interp;
    diagnostics.extend(session.finish());
    ExecResult {
        output,
        diagnostics,
    }
}

struct Interp<'a> {
    config: &'a GeneratorConfig,
    pins: PinTable,
    session: GenerationSession,
    output: ExecOutput,
    diagnostics: Vec<Diagnostic>,
}

impl Interp<'_> {
    fn run(&mut self, script: &Script) -> Result<(), Diagnostic> {
        for item in &script.items {
            match &item.kind {
                ItemKind::Pins(names) => {
                    for name in names {
                        self.pins.add(&name.name).map_err(at(name.span))?;
                    }
                }
                ItemKind::Pattern(block) => self.pattern(block)?,
                ItemKind::Flow(block) => self.flow(block)?,
                ItemKind::Instance { name, args } => self.instance(name, args)?,
                ItemKind::Patset { name, patterns } => {
                    let patterns: Vec<&str> = patterns.iter().map(|p| p.name.as_str()).collect();
                    self.output
                        .patsets
                        .add(PatternSet::new(&name.name, &patterns));
                }
            }
        }

        let span = script.span;
        self.output.instances.uniq().map_err(at(span))?;
        self.output.patsets.uniq().map_err(at(span))?;
        self.output
            .instances
            .register(&mut self.session)
            .map_err(at(span))?;
        self.output
            .patsets
            .register(&mut self.session)
            .map_err(at(span))?;
        Ok(())
    }

    fn pattern(&mut self, block: &NamedBlock) -> Result<(), Diagnostic> {
        log::debug!("executing pattern '{}'", block.name.name);
        let mut ctrl = SequenceController::new(&block.name.name, self.pins.clone(), self.config.clone());
        exec_pattern_body(&mut ctrl, &block.body)?;
        let pattern = ctrl.finish();
        self.diagnostics.extend(pattern.warnings.iter().cloned());
        self.session
            .register("pattern", "patterns", &pattern.name)
            .map_err(at(block.name.span))?;
        self.output.patterns.push(pattern);
        Ok(())
    }

    fn flow(&mut self, block: &NamedBlock) -> Result<(), Diagnostic> {
        log::debug!("executing flow '{}'", block.name.name);
        let mut builder = FlowBuilder::new(&block.name.name);
        exec_flow_body(&mut builder, &block.body)?;
        let (flow, warnings) = builder.finalize().map_err(at(block.name.span))?;
        self.diagnostics.extend(warnings);
        self.session
            .register("flow", "flows", &flow.name)
            .map_err(at(block.name.span))?;
        self.output.flows.push(flow);
        Ok(())
    }

    fn instance(&mut self, name: &Ident, args: &[Arg]) -> Result<(), Diagnostic> {
        let mut kind = "functional".to_string();
        let mut attrs = Vec::new();
        for arg in args {
            match arg {
                Arg::Pair(key, value) if key.name == "type" => kind = value.text(),
                Arg::Pair(key, value) => attrs.push((key.name.clone(), value.text())),
                other => {
                    return Err(misuse(
                        "instance attributes must be written as key=value",
                        other.span(),
                    ))
                }
            }
        }
        let mut inst = TestInstance::new(&name.name, &kind);
        for (key, value) in &attrs {
            inst = inst.with_attr(key, value);
        }
        self.output.instances.add(inst);
        Ok(())
    }
}

// ── Diagnostics ──

fn at(span: Span) -> impl Fn(GenError) -> Diagnostic {
    move |err| {
        Diagnostic::new(DiagLevel::Error, err.to_string())
            .with_code(codes::E0100)
            .with_span(span)
    }
}

fn misuse(message: impl Into<String>, span: Span) -> Diagnostic {
    Diagnostic::new(DiagLevel::Error, message)
        .with_code(codes::E0002)
        .with_span(span)
}

// ── Argument access ──

fn positional(cmd: &Command) -> Vec<&Arg> {
    cmd.positional().collect()
}

fn word_at<'c>(cmd: &'c Command, args: &[&'c Arg], index: usize, what: &str) -> Result<&'c str, Diagnostic> {
    match args.get(index).copied() {
        Some(Arg::Word(id)) => Ok(&id.name),
        Some(other) => Err(misuse(
            format!("'{}' expects {what}, found '{}'", cmd.name(), other.text()),
            other.span(),
        )),
        None => Err(misuse(format!("'{}' expects {what}", cmd.name()), cmd.span)),
    }
}

/// Largest count a numeric literal carries without rounding (2^53).
const MAX_EXACT_COUNT: f64 = 9_007_199_254_740_992.0;

fn count_of(cmd: &Command, arg: &Arg) -> Result<u64, Diagnostic> {
    match arg {
        Arg::Number(n, span) => {
            if n.fract() != 0.0 || *n < 0.0 {
                Err(misuse(
                    format!("'{}' expects a whole number, found {n}", cmd.name()),
                    *span,
                ))
            } else if *n > MAX_EXACT_COUNT {
                Err(misuse(
                    format!("'{}' count {n} is too large to represent exactly", cmd.name()),
                    *span,
                ))
            } else {
                Ok(*n as u64)
            }
        }
        other => Err(misuse(
            format!("'{}' expects a number, found '{}'", cmd.name(), other.text()),
            other.span(),
        )),
    }
}

fn count_at(cmd: &Command, args: &[&Arg], index: usize) -> Result<u64, Diagnostic> {
    match args.get(index) {
        Some(arg) => count_of(cmd, arg),
        None => Err(misuse(format!("'{}' expects a count", cmd.name()), cmd.span)),
    }
}

fn time_at(cmd: &Command, args: &[&Arg], index: usize) -> Result<Time, Diagnostic> {
    match args.get(index) {
        Some(Arg::Time(t, _)) => Ok(*t),
        Some(other) => Err(misuse(
            format!("'{}' expects a time such as 10ms, found '{}'", cmd.name(), other.text()),
            other.span(),
        )),
        None => Err(misuse(format!("'{}' expects a time", cmd.name()), cmd.span)),
    }
}

fn bit_at(cmd: &Command, args: &[&Arg], index: usize) -> Result<bool, Diagnostic> {
    match count_at(cmd, args, index)? {
        0 => Ok(false),
        1 => Ok(true),
        n => Err(misuse(
            format!("'{}' expects 0 or 1, found {n}", cmd.name()),
            args[index].span(),
        )),
    }
}

fn words(cmd: &Command, args: &[&Arg]) -> Result<Vec<String>, Diagnostic> {
    if args.is_empty() {
        return Err(misuse(format!("'{}' expects at least one pin", cmd.name()), cmd.span));
    }
    (0..args.len())
        .map(|i| word_at(cmd, args, i, "a pin name").map(str::to_string))
        .collect()
}

fn block_of(cmd: &Command) -> Result<&[Command], Diagnostic> {
    cmd.block
        .as_deref()
        .ok_or_else(|| misuse(format!("'{}' needs a {{ ... }} block", cmd.name()), cmd.span))
}

fn no_block(cmd: &Command) -> Result<(), Diagnostic> {
    match cmd.block {
        Some(_) => Err(misuse(format!("'{}' does not take a block", cmd.name()), cmd.span)),
        None => Ok(()),
    }
}

// ── Pattern statements ──

fn exec_pattern_body(ctrl: &mut SequenceController, body: &[Command]) -> Result<(), Diagnostic> {
    for cmd in body {
        exec_pattern_command(ctrl, cmd)?;
    }
    Ok(())
}

fn exec_pattern_command(ctrl: &mut SequenceController, cmd: &Command) -> Result<(), Diagnostic> {
    let args = positional(cmd);
    let span = cmd.span;
    let gen = at(span);

    if cmd.name() != "timeset" && !is_scoped(cmd.name()) {
        no_block(cmd)?;
    }

    match cmd.name() {
        "timeset" => {
            let name = word_at(cmd, &args, 0, "a timeset name")?;
            let period = match args.get(1) {
                Some(_) => Some(time_at(cmd, &args, 1)?),
                None => None,
            };
            match &cmd.block {
                Some(block) => ctrl
                    .with_timeset(name, period, |c| Ok(exec_pattern_body(c, block)))
                    .map_err(gen)??,
                None => ctrl.set_timeset(name, period).map_err(gen)?,
            }
        }
        "wave" => {
            let timeset = word_at(cmd, &args, 0, "a timeset name")?;
            let pin = word_at(cmd, &args, 1, "a pin name")?;
            let mut drive = cmd.pair("drive").map(Arg::text);
            let mut compare = cmd.pair("compare").map(Arg::text);
            let rest = &args[2.min(args.len())..];
            for pair in rest.chunks(2) {
                let key = match pair[0] {
                    Arg::Word(id) => id.name.as_str(),
                    other => return Err(misuse("expected 'drive' or 'compare'", other.span())),
                };
                let Some(value) = pair.get(1) else {
                    return Err(misuse(format!("'{key}' needs a formula"), pair[0].span()));
                };
                match key {
                    "drive" => drive = Some(value.text()),
                    "compare" => compare = Some(value.text()),
                    _ => return Err(misuse("expected 'drive' or 'compare'", pair[0].span())),
                }
            }
            ctrl.add_wave(timeset, pin, drive.as_deref(), compare.as_deref())
                .map_err(gen)?;
        }
        "drive" | "compare" => {
            let pin = word_at(cmd, &args, 0, "a pin name")?;
            let high = bit_at(cmd, &args, 1)?;
            let result = if cmd.name() == "drive" {
                ctrl.drive(pin, high)
            } else {
                ctrl.compare(pin, high)
            };
            result.map_err(gen)?;
        }
        "dont_care" | "drive_mem" | "expect_mem" => {
            for pin in words(cmd, &args)? {
                let result = match cmd.name() {
                    "dont_care" => ctrl.dont_care(&pin),
                    "drive_mem" => ctrl.drive_mem(&pin),
                    _ => ctrl.expect_mem(&pin),
                };
                result.map_err(&gen)?;
            }
        }
        "cycle" => {
            let mut opts = CycleOptions::default();
            let mut i = 0;
            while i < args.len() {
                match args[i] {
                    Arg::Number(..) => opts.repeat = Some(count_of(cmd, args[i])?),
                    Arg::Word(id) if id.name == "timeset" => {
                        opts.timeset = Some(word_at(cmd, &args, i + 1, "a timeset name")?.to_string());
                        i += 1;
                    }
                    other => {
                        return Err(misuse(
                            format!("unexpected 'cycle' argument '{}'", other.text()),
                            other.span(),
                        ))
                    }
                }
                i += 1;
            }
            if let Some(ts) = cmd.pair("timeset") {
                opts.timeset = Some(ts.text());
            }
            if opts.repeat == Some(0) {
                return Err(gen(GenError::InvalidRepeat(0)));
            }
            ctrl.cycle_with(opts).map_err(gen)?;
        }
        "delay" => {
            let n = count_at(cmd, &args, 0)?;
            ctrl.delay(n).map_err(gen)?;
        }
        "wait" => ctrl.wait(time_at(cmd, &args, 0)?).map_err(gen)?,
        "clock" => exec_clock(ctrl, cmd, &args)?,
        "label" => ctrl.label(word_at(cmd, &args, 0, "a label name")?),
        "comment" => {
            let text: Vec<String> = args.iter().map(|a| a.text()).collect();
            ctrl.comment(&text.join(" "));
        }
        "store" => {
            let offset = match (cmd.pair("offset"), args.first()) {
                (Some(v), _) => count_of(cmd, v)?,
                (None, Some(Arg::Word(id))) if id.name == "offset" => count_at(cmd, &args, 1)?,
                (None, Some(other)) => {
                    return Err(misuse("expected 'store' or 'store offset N'", other.span()))
                }
                (None, None) => 0,
            };
            ctrl.store(offset as usize).map_err(gen)?;
        }
        "call" => ctrl
            .call_subroutine(word_at(cmd, &args, 0, "a subroutine name")?)
            .map_err(gen)?,
        "subroutine" => ctrl.define_subroutine(word_at(cmd, &args, 0, "a subroutine name")?),
        "group_size" => {
            let size = count_at(cmd, &args, 0)?;
            let size = u32::try_from(size).map_err(|_| gen(GenError::InvalidGroupSize(u32::MAX)))?;
            ctrl.set_vector_group_size(size).map_err(gen)?;
        }
        "loop" => {
            let label = word_at(cmd, &args, 0, "a loop label")?;
            let count = count_at(cmd, &args, 1)?;
            let block = block_of(cmd)?;
            ctrl.loop_vector(label, count, |c| Ok(exec_pattern_body(c, block)))
                .map_err(gen)??;
        }
        "ignore_fails" => {
            let pins = words(cmd, &args)?;
            let pins: Vec<&str> = pins.iter().map(String::as_str).collect();
            let block = block_of(cmd)?;
            ctrl.ignore_fails(&pins, |c| Ok(exec_pattern_body(c, block)))
                .map_err(gen)??;
        }
        "inhibit" => {
            let what = word_at(cmd, &args, 0, "'vectors' or 'comments'")?;
            let block = block_of(cmd)?;
            match what {
                "vectors" => ctrl
                    .inhibit_vectors_and_comments(|c| Ok(exec_pattern_body(c, block)))
                    .map_err(gen)??,
                "comments" => ctrl
                    .inhibit_comments(|c| Ok(exec_pattern_body(c, block)))
                    .map_err(gen)??,
                _ => return Err(misuse("expected 'inhibit vectors' or 'inhibit comments'", args[0].span())),
            }
        }
        "threads" => {
            let set = build_threads(block_of(cmd)?)?;
            ctrl.run_threads(&set).map_err(gen)?;
        }
        other => {
            return Err(misuse(format!("unknown pattern statement '{other}'"), cmd.head.span));
        }
    }
    Ok(())
}

fn is_scoped(name: &str) -> bool {
    matches!(name, "loop" | "ignore_fails" | "inhibit" | "threads")
}

fn exec_clock(ctrl: &mut SequenceController, cmd: &Command, args: &[&Arg]) -> Result<(), Diagnostic> {
    let gen = at(cmd.span);
    let action = word_at(cmd, args, 0, "enable, start, stop, pause or resume")?;
    let pin = word_at(cmd, args, 1, "a pin name")?;
    let frequency = match args.get(2) {
        Some(Arg::Freq(hz, _)) => Some(Frequency::from_hz(*hz)),
        Some(other) => {
            return Err(misuse(
                format!("expected a frequency such as 2MHz, found '{}'", other.text()),
                other.span(),
            ))
        }
        None => None,
    };
    let result = match action {
        "enable" => {
            let Some(frequency) = frequency else {
                return Err(misuse("'clock enable' needs a frequency", cmd.span));
            };
            ctrl.enable_clock(pin, frequency)
        }
        "start" => ctrl.start_clock(pin),
        "stop" => ctrl.stop_clock(pin),
        "pause" => ctrl.pause_clock(pin),
        "resume" => ctrl.resume_clock(pin, frequency),
        _ => {
            return Err(misuse(
                format!("unknown clock action '{action}'"),
                args[0].span(),
            ))
        }
    };
    result.map_err(gen)
}

fn build_threads(body: &[Command]) -> Result<ThreadSet, Diagnostic> {
    let mut set = ThreadSet::new();
    for cmd in body {
        if cmd.name() != "thread" {
            return Err(misuse(
                format!("only 'thread' blocks may appear in 'threads', found '{}'", cmd.name()),
                cmd.head.span,
            ));
        }
        let args = positional(cmd);
        let name = word_at(cmd, &args, 0, "a thread name")?;
        let thread = set.thread(name);
        for op in block_of(cmd)? {
            no_block(op)?;
            let args = positional(op);
            match op.name() {
                "drive" | "compare" => {
                    let pin = word_at(op, &args, 0, "a pin name")?;
                    let high = bit_at(op, &args, 1)?;
                    let state = if op.name() == "drive" {
                        PinState::drive(high)
                    } else {
                        PinState::compare(high)
                    };
                    thread.set(pin, state);
                }
                "dont_care" | "drive_mem" | "expect_mem" => {
                    let state = match op.name() {
                        "dont_care" => PinState::DontCare,
                        "drive_mem" => PinState::DriveMem,
                        _ => PinState::ExpectMem,
                    };
                    for pin in words(op, &args)? {
                        thread.set(&pin, state);
                    }
                }
                "cycle" | "cycles" | "delay" => {
                    let n = match args.first() {
                        Some(_) => count_at(op, &args, 0)?,
                        None => 1,
                    };
                    thread.cycles(n);
                }
                "wait" => {
                    thread.wait(time_at(op, &args, 0)?);
                }
                "sync" => {
                    thread.sync();
                }
                other => {
                    return Err(misuse(
                        format!("unknown thread statement '{other}'"),
                        op.head.span,
                    ))
                }
            }
        }
    }
    Ok(set)
}

// ── Flow statements ──

fn exec_flow_body(builder: &mut FlowBuilder, body: &[Command]) -> Result<(), Diagnostic> {
    for cmd in body {
        exec_flow_command(builder, cmd)?;
    }
    Ok(())
}

fn exec_flow_command(builder: &mut FlowBuilder, cmd: &Command) -> Result<(), Diagnostic> {
    let args = positional(cmd);
    let gen = at(cmd.span);

    match cmd.name() {
        "if_job" | "unless_job" => {
            let jobs = words(cmd, &args)?;
            let jobs: Vec<&str> = jobs.iter().map(String::as_str).collect();
            let block = block_of(cmd)?;
            let result = if cmd.name() == "if_job" {
                builder.with_if_job(&jobs, |b| Ok(exec_flow_body(b, block)))
            } else {
                builder.with_unless_job(&jobs, |b| Ok(exec_flow_body(b, block)))
            };
            result.map_err(gen)??;
        }
        "if_enable" | "unless_enable" => {
            let word = word_at(cmd, &args, 0, "a flow enable word")?;
            let block = block_of(cmd)?;
            let result = if cmd.name() == "if_enable" {
                builder.with_if_enable(word, |b| Ok(exec_flow_body(b, block)))
            } else {
                builder.with_unless_enable(word, |b| Ok(exec_flow_body(b, block)))
            };
            result.map_err(gen)??;
        }
        name => {
            no_block(cmd)?;
            let Some(op) = FlowOp::from_name(name) else {
                return Err(misuse(format!("unknown flow statement '{name}'"), cmd.head.span));
            };
            let parameter = args.first().map(|a| a.text()).unwrap_or_default();
            if let Some(extra) = args.get(1) {
                return Err(misuse(
                    format!("'{name}' takes one parameter; write further values as key=value"),
                    extra.span(),
                ));
            }
            let attrs: Vec<(String, String)> = cmd
                .args
                .iter()
                .filter_map(|a| match a {
                    Arg::Pair(k, v) => Some((k.name.clone(), v.text())),
                    _ => None,
                })
                .collect();
            builder
                .add(
                    op,
                    &parameter,
                    attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                )
                .map_err(gen)?;
        }
    }
    Ok(())
}

// ── Tests ──
