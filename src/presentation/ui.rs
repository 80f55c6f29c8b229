use crate::application::{
    branch_fields, App, AppMode, BranchField, FormField, LookupKind, MaterialsFocus, RowField,
    TextForm, WizardStep, ROW_FIELDS,
};
use crate::domain::ServiceBranch;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table},
    Frame,
};

/// Options shown under the field being edited.
const MAX_VISIBLE_OPTIONS: usize = 8;

pub fn render_ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    match app.mode {
        AppMode::Login => {
            if let Some(form) = &app.text_form {
                render_text_form(f, form, centered(f.area(), 50, 9));
            }
        }
        _ => match app.wizard.step() {
            WizardStep::CollectingRequest => render_request_form(f, app, chunks[1]),
            WizardStep::CompletingMaterials { solicitud_id } => {
                render_materials(f, app, solicitud_id, chunks[1])
            }
            WizardStep::Submitted { solicitud_id } => render_submitted(f, solicitud_id, chunks[1]),
        },
    }
    render_status_bar(f, app, chunks[2]);

    if app.mode == AppMode::SubForm {
        if let Some(form) = &app.text_form {
            render_text_form(f, form, centered(f.area(), 50, 9));
        }
    }
    if app.mode == AppMode::Help {
        render_help_popup(f, app.help_scroll);
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let step = match app.wizard.step() {
        WizardStep::CollectingRequest => "Step 1/2: request".to_string(),
        WizardStep::CompletingMaterials { solicitud_id } => format!("Step 2/2: materials for #{solicitud_id}"),
        WizardStep::Submitted { solicitud_id } => format!("Request #{solicitud_id} submitted"),
    };
    let user = match app.session.usuario_id() {
        Some(id) => format!("user {id}"),
        None => "signed out".to_string(),
    };
    let header = Paragraph::new(format!("solicita - Service requests | {step} | {user}"))
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(header, area);
}

fn render_text_form(f: &mut Frame, form: &TextForm, area: Rect) {
    f.render_widget(Clear, area);
    let lines: Vec<Line> = form
        .inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let value = if input.secret {
                "*".repeat(input.value.chars().count())
            } else {
                input.value.clone()
            };
            let style = if i == form.focus {
                Style::default().bg(Color::Blue).fg(Color::White)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{:>10}: ", input.label), Style::default().fg(Color::Yellow)),
                Span::styled(value, style),
            ])
        })
        .collect();

    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(form.title())
            .style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(widget, area);
}

fn loading_marker(app: &App, field: FormField) -> &'static str {
    let kind = match field {
        FormField::Direccion => LookupKind::Direcciones,
        FormField::Contacto => LookupKind::Contactos,
        FormField::Material => LookupKind::Materiales,
        _ => return "",
    };
    if app.lookups.is_loading(kind) { " (loading...)" } else { "" }
}

fn render_request_form(f: &mut Frame, app: &App, area: Rect) {
    let rows: Vec<Row> = FormField::ALL
        .iter()
        .map(|&field| {
            let focused = field == app.focus;
            let editing = focused && app.mode == AppMode::Editing;
            let value = if editing {
                format!("{}_", app.input)
            } else {
                format!("{}{}", app.form_value(field), loading_marker(app, field))
            };
            let style = if editing {
                Style::default().fg(Color::Green)
            } else if focused {
                Style::default().bg(Color::Blue).fg(Color::White)
            } else if field == FormField::Generador && app.wizard.draft().generador_igual_cliente {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(field.label()).style(Style::default().fg(Color::Yellow)),
                Cell::from(value).style(style),
            ])
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(20), Constraint::Min(10)])
        .block(Block::default().borders(Borders::ALL).title("New service request"))
        .column_spacing(1);
    f.render_widget(table, area);

    if app.mode == AppMode::Editing {
        let index = FormField::ALL.iter().position(|&f| f == app.focus).unwrap_or(0) as u16;
        render_options(f, app, area, index + 2);
    }
}

/// Drop-down of the options for the field being edited, placed under it.
fn render_options(f: &mut Frame, app: &App, area: Rect, row_offset: u16) {
    let options = app.current_options();
    if options.is_empty() {
        return;
    }
    let start = app
        .option_index
        .map(|i| i.saturating_sub(MAX_VISIBLE_OPTIONS - 1))
        .unwrap_or(0);
    let items: Vec<ListItem> = options
        .iter()
        .enumerate()
        .skip(start)
        .take(MAX_VISIBLE_OPTIONS)
        .map(|(i, option)| {
            let style = if Some(i) == app.option_index {
                Style::default().bg(Color::LightBlue).fg(Color::Black)
            } else {
                Style::default()
            };
            ListItem::new(option.as_str()).style(style)
        })
        .collect();

    let height = (items.len() as u16 + 2).min(area.height.saturating_sub(row_offset));
    if height < 3 {
        return;
    }
    let popup = Rect {
        x: area.x + 22,
        y: area.y + row_offset,
        width: area.width.saturating_sub(24).min(60),
        height,
    };
    f.render_widget(Clear, popup);
    f.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title("Up/Down to pick")),
        popup,
    );
}

fn cell_style(app: &App, target: MaterialsFocus, locked: bool) -> Style {
    if target != app.materials_focus {
        return if locked {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };
    }
    if app.mode == AppMode::Editing {
        Style::default().fg(Color::Green)
    } else {
        Style::default().bg(Color::Blue).fg(Color::White)
    }
}

fn cell_text(app: &App, target: MaterialsFocus, value: &str) -> String {
    if target == app.materials_focus && app.mode == AppMode::Editing {
        format!("{}_", app.input)
    } else if value.is_empty() {
        " ".to_string()
    } else {
        value.to_string()
    }
}

fn render_materials(f: &mut Frame, app: &App, solicitud_id: u64, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(5)])
        .split(area);

    let header = Row::new(vec![
        Cell::from("#"),
        Cell::from("Material"),
        Cell::from("Quantity"),
        Cell::from("Unit"),
    ])
    .style(Style::default().fg(Color::Yellow));

    let rows: Vec<Row> = app
        .wizard
        .rows()
        .iter()
        .enumerate()
        .map(|(row, line)| {
            let locked = app.wizard.is_row_sent(row);
            let marker = if locked { format!("{} ok", row + 1) } else { format!("{}", row + 1) };
            let mut cells = vec![Cell::from(marker).style(Style::default().fg(Color::Yellow))];
            for field in ROW_FIELDS {
                let value = match field {
                    RowField::Material => &line.material,
                    RowField::Cantidad => &line.cantidad,
                    RowField::Unidad => &line.unidad,
                };
                let target = MaterialsFocus::Row { row, field };
                cells.push(Cell::from(cell_text(app, target, value)).style(cell_style(app, target, locked)));
            }
            Row::new(cells)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Percentage(50),
            Constraint::Length(12),
            Constraint::Percentage(30),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Residue lines for request #{solicitud_id}")),
    )
    .column_spacing(1);
    f.render_widget(table, chunks[0]);

    render_branch(f, app, chunks[1]);

    if app.mode == AppMode::Editing {
        let offset = match app.materials_focus {
            MaterialsFocus::Row { row, .. } => row as u16 + 3,
            MaterialsFocus::Branch(_) => chunks[0].height,
        };
        render_options(f, app, area, offset);
    }
}

fn branch_label(field: BranchField) -> &'static str {
    match field {
        BranchField::Material => "Service material",
        BranchField::Cantidad => "Quantity",
        BranchField::TipoTransporte => "Transport type",
        BranchField::Capacidad => "Capacity",
        BranchField::Unidad => "Unit",
    }
}

fn render_branch(f: &mut Frame, app: &App, area: Rect) {
    let branch = app.wizard.branch();
    let values: [&str; 3] = match branch {
        ServiceBranch::Servicio(info) => [info.material.as_str(), info.cantidad.as_str(), info.unidad.as_str()],
        ServiceBranch::Transporte(info) => [
            info.tipo_transporte.as_str(),
            info.capacidad.as_str(),
            info.unidad.as_str(),
        ],
    };
    let rows: Vec<Row> = branch_fields(branch)
        .into_iter()
        .zip(values)
        .map(|(field, value)| {
            let target = MaterialsFocus::Branch(field);
            Row::new(vec![
                Cell::from(branch_label(field)).style(Style::default().fg(Color::Yellow)),
                Cell::from(cell_text(app, target, value)).style(cell_style(app, target, false)),
            ])
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(20), Constraint::Min(10)])
        .block(Block::default().borders(Borders::ALL).title(format!("{} details", branch.name())));
    f.render_widget(table, area);
}

fn render_submitted(f: &mut Frame, solicitud_id: u64, area: Rect) {
    let text = vec![
        Line::from(Span::styled(
            format!("Request #{solicitud_id} was submitted."),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Press Enter to start a new request or Ctrl+Q to quit."),
    ];
    let widget = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Done"));
    f.render_widget(widget, area);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let hints = match app.wizard.step() {
        WizardStep::CollectingRequest => {
            "Tab/arrows: move | Enter: edit | Space: toggle | Ctrl+S: create | Ctrl+A/Ctrl+K: new address/contact | F1: help"
        }
        WizardStep::CompletingMaterials { .. } => {
            "Enter: edit | Ctrl+N/Ctrl+D: add/delete line | Ctrl+O: import CSV | Ctrl+S: submit | Ctrl+B: back | F1: help"
        }
        WizardStep::Submitted { .. } => "Enter: new request | Ctrl+L: sign out | Ctrl+Q: quit",
    };
    let input_text = match app.mode {
        AppMode::Login => app
            .status_message
            .clone()
            .unwrap_or_else(|| "Tab: next field | Enter: sign in | Ctrl+R: switch sign in/register | Ctrl+Q: quit".to_string()),
        AppMode::Form => app.status_message.clone().unwrap_or_else(|| hints.to_string()),
        AppMode::Editing => match &app.status_message {
            Some(status) => format!("Editing: {} | {status}", app.input),
            None => format!("Editing: {} (Enter to accept, Esc to cancel, Up/Down for options)", app.input),
        },
        AppMode::SubForm => app
            .status_message
            .clone()
            .unwrap_or_else(|| "Tab: next field | Enter: create | Esc: cancel".to_string()),
        AppMode::ImportCsv => format!("Import CSV from: {} (Enter to import, Esc to cancel)", app.filename_input),
        AppMode::Help => "Up/Down: scroll | PgUp/PgDn: fast scroll | Home: top | Esc/q: close help".to_string(),
    };

    let style = if app.submitting {
        Style::default().fg(Color::Yellow)
    } else {
        match app.mode {
            AppMode::Login | AppMode::Form => Style::default(),
            AppMode::Editing => Style::default().fg(Color::Green),
            AppMode::SubForm => Style::default().fg(Color::Magenta),
            AppMode::ImportCsv => Style::default().fg(Color::Green),
            AppMode::Help => Style::default().fg(Color::Cyan),
        }
    };
    let input = Paragraph::new(input_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(style);
    f.render_widget(input, area);
}

fn render_help_popup(f: &mut Frame, scroll: usize) {
    let area = f.area();
    let popup_area = Rect {
        x: area.width / 10,
        y: area.height / 10,
        width: area.width * 4 / 5,
        height: area.height * 4 / 5,
    };

    f.render_widget(Clear, popup_area);

    let help_text = get_help_text();
    let help_lines: Vec<&str> = help_text.lines().collect();
    let visible_height = popup_area.height.saturating_sub(2) as usize;

    let start_line = scroll.min(help_lines.len().saturating_sub(visible_height));
    let end_line = (start_line + visible_height).min(help_lines.len());

    let visible_text = help_lines[start_line..end_line].join("\n");

    let help_widget = Paragraph::new(visible_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("solicita help (Line {}/{})", start_line + 1, help_lines.len()))
                .style(Style::default().fg(Color::Cyan)),
        )
        .style(Style::default().fg(Color::White));

    f.render_widget(help_widget, popup_area);
}

pub fn get_help_text() -> &'static str {
    r#"SOLICITA: SERVICE REQUEST WIZARD

=== STEP 1: THE REQUEST ===
Client          Type a name or code; suggestions appear after 2 characters.
                Up/Down picks a suggestion. The code before " - " is the client.
Service date    YYYY-MM-DD, today or later
Service time    HH:MM between 08:00 and 18:00 on a quarter hour
Address         Required when transport is requested (Ctrl+A creates one)
Contact         Optional (Ctrl+K creates one)
Generator       Required unless "Generator is client" is checked
Ctrl+S          Validate and create the request

The form is saved on every change and restored on the next start.

=== STEP 2: MATERIALS ===
Each line needs material, quantity and unit. Blank lines are ignored;
half-filled lines are rejected. Quantities accept 1.5 or 1,5.
Ctrl+N          Add a line
Ctrl+D          Delete the focused line
Ctrl+O          Import lines from a CSV file (material,cantidad,unidad)
Ctrl+S          Send every line, then the service or transport details
Ctrl+B          Abandon step 2 and start a new request

If a line is rejected, lines already accepted are marked "ok" and locked.
Fix the problem and press Ctrl+S again; only the remaining lines are sent.

=== EDITING ===
Enter           Edit the focused field / accept the edit
Esc             Cancel the edit and restore the previous value
Up/Down         While editing, cycle through the available options
Ctrl+V          Paste from the clipboard
Space           Toggle a checkbox

=== GENERAL ===
Tab/Shift+Tab   Next/previous field
F1 or ?         Show this help (scroll with Up/Down, PgUp/PgDn, Home)
Ctrl+L          Sign out
Ctrl+Q          Quit

=== HELP NAVIGATION ===
Up/Down or j/k  Scroll help text up/down one line
Page Up/Down    Scroll help text up/down 5 lines
Home            Jump to top of help text
Esc/F1/?/q      Close this help window"#
}
