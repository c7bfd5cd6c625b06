use teloxide::types::User;

pub fn full_name(user: &User) -> String {
    match &user.last_name {
        Some(last) => format!("{} {}", user.first_name, last),
        None => user.first_name.clone(),
    }
}
