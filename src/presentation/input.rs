use crate::application::{App, AppMode, WizardStep};
use crate::application::TextFormKind;
use crate::infrastructure::{paste_text, single_line};
use crossterm::event::{KeyCode, KeyModifiers};

pub struct InputHandler;

impl InputHandler {
    pub fn handle_key_event(app: &mut App, key: KeyCode, modifiers: KeyModifiers) {
        let ctrl = modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key == KeyCode::Char('q') {
            app.should_quit = true;
            return;
        }
        if key == KeyCode::F(1) && app.mode != AppMode::Help {
            app.open_help();
            return;
        }

        match app.mode {
            AppMode::Login => Self::handle_text_form_mode(app, key, modifiers),
            AppMode::Form => Self::handle_form_mode(app, key, modifiers),
            AppMode::Editing => Self::handle_editing_mode(app, key, modifiers),
            AppMode::SubForm => Self::handle_text_form_mode(app, key, modifiers),
            AppMode::ImportCsv => Self::handle_filename_input_mode(app, key),
            AppMode::Help => Self::handle_help_mode(app, key),
        }
    }

    fn handle_form_mode(app: &mut App, key: KeyCode, modifiers: KeyModifiers) {
        if modifiers.contains(KeyModifiers::CONTROL) {
            match key {
                KeyCode::Char('s') => app.submit_current_step(),
                KeyCode::Char('b') => app.go_back(),
                KeyCode::Char('n') => app.add_row(),
                KeyCode::Char('d') => app.remove_focused_row(),
                KeyCode::Char('o') => app.start_csv_import(),
                KeyCode::Char('a') => app.open_sub_form(TextFormKind::NewDireccion),
                KeyCode::Char('k') => app.open_sub_form(TextFormKind::NewContacto),
                KeyCode::Char('l') => app.logout(),
                _ => {}
            }
            return;
        }

        // Navigation clears the last message; actions set their own.
        app.status_message = None;

        match key {
            KeyCode::Tab => app.focus_next(),
            KeyCode::BackTab => app.focus_previous(),
            KeyCode::Up | KeyCode::Char('k') => app.move_up(),
            KeyCode::Down | KeyCode::Char('j') => app.move_down(),
            KeyCode::Left | KeyCode::Char('h') => app.move_column(false),
            KeyCode::Right | KeyCode::Char('l') => app.move_column(true),
            KeyCode::Enter | KeyCode::F(2) => app.activate_focused(),
            KeyCode::Char(' ') => {
                if matches!(app.wizard.step(), WizardStep::CollectingRequest) {
                    app.toggle_focused();
                }
            }
            KeyCode::Char('?') => app.open_help(),
            KeyCode::Char('q') => app.should_quit = true,
            _ => {}
        }
    }

    fn handle_editing_mode(app: &mut App, key: KeyCode, modifiers: KeyModifiers) {
        if modifiers.contains(KeyModifiers::CONTROL) {
            if key == KeyCode::Char('v') {
                match paste_text() {
                    Ok(text) => app.insert_text(&single_line(&text)),
                    Err(e) => app.status_message = Some(e),
                }
            }
            return;
        }

        match key {
            KeyCode::Enter | KeyCode::Tab => app.finish_editing(),
            KeyCode::Esc => app.cancel_editing(),
            KeyCode::Up => app.cycle_option(false),
            KeyCode::Down => app.cycle_option(true),
            KeyCode::Backspace => app.backspace(),
            KeyCode::Delete => app.delete_char(),
            KeyCode::Left => {
                if app.cursor_position > 0 {
                    app.cursor_position -= 1;
                }
            }
            KeyCode::Right => {
                if app.cursor_position < app.input.chars().count() {
                    app.cursor_position += 1;
                }
            }
            KeyCode::Home => {
                app.cursor_position = 0;
            }
            KeyCode::End => {
                app.cursor_position = app.input.chars().count();
            }
            KeyCode::Char(c) => app.insert_char(c),
            _ => {}
        }
    }

    /// Login screen and the address/contact sub-forms.
    fn handle_text_form_mode(app: &mut App, key: KeyCode, modifiers: KeyModifiers) {
        if modifiers.contains(KeyModifiers::CONTROL) {
            match key {
                KeyCode::Char('r') if app.mode == AppMode::Login => app.toggle_register(),
                KeyCode::Char('v') => match paste_text() {
                    Ok(text) => {
                        if let Some(value) = app.text_form.as_mut().and_then(|f| f.focused_mut()) {
                            value.push_str(&single_line(&text));
                        }
                    }
                    Err(e) => app.status_message = Some(e),
                },
                _ => {}
            }
            return;
        }

        match key {
            KeyCode::Enter => {
                if app.mode == AppMode::Login {
                    app.submit_login();
                } else {
                    app.submit_sub_form();
                }
            }
            KeyCode::Esc => {
                if app.mode == AppMode::SubForm {
                    app.close_sub_form();
                }
            }
            KeyCode::Tab | KeyCode::Down => {
                if let Some(form) = app.text_form.as_mut() {
                    form.next();
                }
            }
            KeyCode::BackTab | KeyCode::Up => {
                if let Some(form) = app.text_form.as_mut() {
                    form.previous();
                }
            }
            KeyCode::Backspace => {
                if let Some(value) = app.text_form.as_mut().and_then(|f| f.focused_mut()) {
                    value.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(value) = app.text_form.as_mut().and_then(|f| f.focused_mut()) {
                    value.push(c);
                }
            }
            _ => {}
        }
    }

    fn handle_help_mode(app: &mut App, key: KeyCode) {
        match key {
            KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('?') | KeyCode::Char('q') => {
                app.close_help();
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.help_scroll = app.help_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                app.help_scroll += 1;
            }
            KeyCode::PageUp => {
                app.help_scroll = app.help_scroll.saturating_sub(5);
            }
            KeyCode::PageDown => {
                app.help_scroll += 5;
            }
            KeyCode::Home => {
                app.help_scroll = 0;
            }
            _ => {}
        }
    }

    fn handle_filename_input_mode(app: &mut App, key: KeyCode) {
        let len = app.filename_input.chars().count();
        match key {
            KeyCode::Enter => app.finish_csv_import(),
            KeyCode::Esc => app.cancel_filename_input(),
            KeyCode::Backspace => {
                if app.cursor_position > 0 {
                    app.cursor_position -= 1;
                    let at = char_to_byte(&app.filename_input, app.cursor_position);
                    app.filename_input.remove(at);
                }
            }
            KeyCode::Delete => {
                if app.cursor_position < len {
                    let at = char_to_byte(&app.filename_input, app.cursor_position);
                    app.filename_input.remove(at);
                }
            }
            KeyCode::Left => {
                if app.cursor_position > 0 {
                    app.cursor_position -= 1;
                }
            }
            KeyCode::Right => {
                if app.cursor_position < len {
                    app.cursor_position += 1;
                }
            }
            KeyCode::Home => {
                app.cursor_position = 0;
            }
            KeyCode::End => {
                app.cursor_position = len;
            }
            KeyCode::Char(c) => {
                let at = char_to_byte(&app.filename_input, app.cursor_position);
                app.filename_input.insert(at, c);
                app.cursor_position += 1;
            }
            _ => {}
        }
    }
}

fn char_to_byte(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(text.len())
}
