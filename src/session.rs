use crate::card::{Card, ExaminationRecord, PersonRecord, StampImage};
use crate::error::SportCardError;

/// Keyed person fields, mirroring the card form's named inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonField {
    Surname,
    GivenNames,
    BirthDate,
    NationalId,
    Organization,
    RegistrationNumber,
    ClinicStampText,
    ClinicRegistryNumber,
    InstructorNotes,
    InstructorRecommendations,
}

/// Keyed examination fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamField {
    Date,
    Height,
    Weight,
    Result,
    StampText,
    NextDate,
}

/// Explicit token for destructive operations. `Cancelled` turns the call
/// into a successful no-op, like dismissing a confirmation dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Cancelled,
}

/// In-memory editing state for a set of cards. Hosts drive it with keyed
/// field updates and hand the card list to the renderer when done.
#[derive(Debug, Clone)]
pub struct CardSession {
    cards: Vec<Card>,
}

impl CardSession {
    pub fn new() -> CardSession {
        CardSession {
            cards: vec![Card::new()],
        }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub fn set_person_field(
        &mut self,
        card: usize,
        field: PersonField,
        value: impl Into<String>,
    ) -> Result<(), SportCardError> {
        let person = &mut self.card_mut(card)?.person;
        let value = value.into();
        match field {
            PersonField::Surname => person.surname = value,
            PersonField::GivenNames => person.given_names = value,
            PersonField::BirthDate => person.birth_date = value,
            PersonField::NationalId => person.national_id = value,
            PersonField::Organization => person.organization = value,
            PersonField::RegistrationNumber => person.registration_number = value,
            PersonField::ClinicStampText => person.clinic_stamp_text = value,
            PersonField::ClinicRegistryNumber => person.clinic_registry_number = value,
            PersonField::InstructorNotes => person.instructor_notes = Some(value),
            PersonField::InstructorRecommendations => {
                person.instructor_recommendations = Some(value)
            }
        }
        Ok(())
    }

    pub fn set_exam_field(
        &mut self,
        card: usize,
        exam: usize,
        field: ExamField,
        value: impl Into<String>,
    ) -> Result<(), SportCardError> {
        let record = self.exam_mut(card, exam)?;
        let value = value.into();
        match field {
            ExamField::Date => record.date = value,
            ExamField::Height => record.height = value,
            ExamField::Weight => record.weight = value,
            ExamField::Result => record.result = value,
            ExamField::StampText => record.stamp_text = Some(value),
            ExamField::NextDate => record.next_date = value,
        }
        Ok(())
    }

    pub fn set_clinic_stamp_image(
        &mut self,
        card: usize,
        image: StampImage,
    ) -> Result<(), SportCardError> {
        self.card_mut(card)?.person.clinic_stamp_image = Some(image);
        Ok(())
    }

    pub fn clear_clinic_stamp_image(&mut self, card: usize) -> Result<(), SportCardError> {
        self.card_mut(card)?.person.clinic_stamp_image = None;
        Ok(())
    }

    pub fn set_exam_stamp_image(
        &mut self,
        card: usize,
        exam: usize,
        image: StampImage,
    ) -> Result<(), SportCardError> {
        self.exam_mut(card, exam)?.stamp_image = Some(image);
        Ok(())
    }

    pub fn clear_exam_stamp_image(
        &mut self,
        card: usize,
        exam: usize,
    ) -> Result<(), SportCardError> {
        self.exam_mut(card, exam)?.stamp_image = None;
        Ok(())
    }

    /// Appends a blank card and returns its index.
    pub fn add_card(&mut self) -> usize {
        self.cards.push(Card::new());
        self.cards.len() - 1
    }

    /// Appends a blank examination row and returns its index.
    pub fn add_examination(&mut self, card: usize) -> Result<usize, SportCardError> {
        let card = self.card_mut(card)?;
        card.examinations.push(ExaminationRecord::default());
        Ok(card.examinations.len() - 1)
    }

    /// Removes one examination row. Refused while the card has only one row,
    /// and a no-op without confirmation. Returns whether a row was removed.
    pub fn remove_examination(
        &mut self,
        card: usize,
        exam: usize,
        confirmation: Confirmation,
    ) -> Result<bool, SportCardError> {
        let card = self.card_mut(card)?;
        if card.examinations.len() <= 1 {
            return Err(SportCardError::InvalidIndex(
                "a card keeps at least one examination row".to_string(),
            ));
        }
        if exam >= card.examinations.len() {
            return Err(SportCardError::InvalidIndex(format!(
                "examination {} out of range ({} rows)",
                exam,
                card.examinations.len()
            )));
        }
        if confirmation == Confirmation::Cancelled {
            return Ok(false);
        }
        card.examinations.remove(exam);
        Ok(true)
    }

    /// Removes one card. Returns whether a card was removed.
    pub fn remove_card(
        &mut self,
        card: usize,
        confirmation: Confirmation,
    ) -> Result<bool, SportCardError> {
        if card >= self.cards.len() {
            return Err(SportCardError::InvalidIndex(format!(
                "card {} out of range ({} cards)",
                card,
                self.cards.len()
            )));
        }
        if confirmation == Confirmation::Cancelled {
            return Ok(false);
        }
        self.cards.remove(card);
        if self.cards.is_empty() {
            self.cards.push(Card::new());
        }
        Ok(true)
    }

    /// Resets the whole session to its initial blank state, images included.
    /// Returns whether the reset happened.
    pub fn clear(&mut self, confirmation: Confirmation) -> bool {
        if confirmation == Confirmation::Cancelled {
            return false;
        }
        self.cards = vec![Card::new()];
        true
    }

    fn card_mut(&mut self, index: usize) -> Result<&mut Card, SportCardError> {
        let count = self.cards.len();
        self.cards.get_mut(index).ok_or_else(|| {
            SportCardError::InvalidIndex(format!("card {} out of range ({} cards)", index, count))
        })
    }

    fn exam_mut(
        &mut self,
        card: usize,
        exam: usize,
    ) -> Result<&mut ExaminationRecord, SportCardError> {
        let card = self.card_mut(card)?;
        let count = card.examinations.len();
        card.examinations.get_mut(exam).ok_or_else(|| {
            SportCardError::InvalidIndex(format!(
                "examination {} out of range ({} rows)",
                exam, count
            ))
        })
    }
}

impl Default for CardSession {
    fn default() -> Self {
        CardSession::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_stamp() -> StampImage {
        let mut bytes = Vec::new();
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png fixture");
        StampImage::from_bytes(bytes).expect("stamp fixture")
    }

    #[test]
    fn starts_with_one_blank_card() {
        let session = CardSession::new();
        assert_eq!(session.card_count(), 1);
        assert_eq!(session.cards()[0].examinations.len(), 1);
    }

    #[test]
    fn keyed_field_updates_land_on_the_right_record() {
        let mut session = CardSession::new();
        session
            .set_person_field(0, PersonField::Surname, "Kowalska")
            .expect("set surname");
        session
            .set_exam_field(0, 0, ExamField::Height, "172 cm")
            .expect("set height");
        assert_eq!(session.cards()[0].person.surname, "Kowalska");
        assert_eq!(session.cards()[0].examinations[0].height, "172 cm");
    }

    #[test]
    fn out_of_range_indices_are_errors() {
        let mut session = CardSession::new();
        assert!(session.set_person_field(3, PersonField::Surname, "x").is_err());
        assert!(session.set_exam_field(0, 5, ExamField::Date, "x").is_err());
    }

    #[test]
    fn last_examination_row_cannot_be_removed() {
        let mut session = CardSession::new();
        let err = session
            .remove_examination(0, 0, Confirmation::Confirmed)
            .unwrap_err();
        assert!(err.to_string().contains("at least one examination"));
    }

    #[test]
    fn cancelled_confirmation_is_a_no_op() {
        let mut session = CardSession::new();
        session.add_examination(0).expect("add row");
        let removed = session
            .remove_examination(0, 1, Confirmation::Cancelled)
            .expect("cancelled remove");
        assert!(!removed);
        assert_eq!(session.cards()[0].examinations.len(), 2);
        assert!(!session.clear(Confirmation::Cancelled));
        assert_eq!(session.card_count(), 1);
    }

    #[test]
    fn clear_resets_everything_including_images() {
        let mut session = CardSession::new();
        session.set_clinic_stamp_image(0, png_stamp()).expect("set image");
        session.add_card();
        session
            .set_person_field(1, PersonField::Organization, "AZS")
            .expect("set org");
        assert!(session.clear(Confirmation::Confirmed));
        assert_eq!(session.card_count(), 1);
        assert!(session.cards()[0].person.clinic_stamp_image.is_none());
        assert!(session.cards()[0].person.organization.is_empty());
    }

    #[test]
    fn removing_the_last_card_leaves_a_blank_one() {
        let mut session = CardSession::new();
        session
            .set_person_field(0, PersonField::Surname, "Nowak")
            .expect("set surname");
        assert!(session.remove_card(0, Confirmation::Confirmed).expect("remove"));
        assert_eq!(session.card_count(), 1);
        assert!(session.cards()[0].person.surname.is_empty());
    }

    #[test]
    fn exam_stamp_images_attach_and_clear() {
        let mut session = CardSession::new();
        session
            .set_exam_stamp_image(0, 0, png_stamp())
            .expect("set stamp");
        assert!(session.cards()[0].examinations[0].stamp_image.is_some());
        session.clear_exam_stamp_image(0, 0).expect("clear stamp");
        assert!(session.cards()[0].examinations[0].stamp_image.is_none());
    }
}
